//! Reads structure out of an exchange: its topic and any facts worth
//! keeping. Both run on the lite model.

use std::sync::Arc;

use async_trait::async_trait;
use pal_llm::{CompletionRequest, LlmProvider};

use super::{CollabError, Fact, FactExtractor, TopicClassifier};

/// Topics at or past this length are treated as noise.
const MAX_TOPIC_CHARS: usize = 50;
const TOPIC_MAX_TOKENS: u32 = 30;
const FACTS_MAX_TOKENS: u32 = 150;

fn topic_prompt(user_text: &str, agent_reply: &str, prior_topic: Option<&str>) -> String {
    format!(
        "What is the main topic being discussed? Give a short phrase (2-5 words).

Pal's response: \"{agent_reply}\"
User's message: \"{user_text}\"
Previous topic: \"{}\"

If Pal asked a question, the topic is what Pal is asking about.
If user introduced something new, that's the new topic.
If user just answered Pal's question, the topic stays the same.

Respond with ONLY the topic phrase, nothing else. Examples:
- \"what a program is\"
- \"how computers work\"
- \"the owner's job\"
- \"what Pal is made of\"

Topic:",
        prior_topic.unwrap_or("none")
    )
}

/// Clean a raw topic answer. `None` for empty, "none", or overlong output.
pub fn parse_topic(raw: &str) -> Option<String> {
    let topic = raw.trim().trim_matches('"').trim().to_lowercase();
    if topic.is_empty() || topic == "none" || topic.chars().count() >= MAX_TOPIC_CHARS {
        return None;
    }
    Some(topic)
}

fn facts_prompt(user_text: &str, owner: &str) -> String {
    format!(
        "Extract simple facts from this message about {owner}.

Message: \"{user_text}\"

Only concrete facts. Short phrases.
Respond: [{{\"content\": \"fact\", \"type\": \"about_owner\"}}]
If nothing: []

JSON only."
    )
}

/// Pull the first JSON array out of `raw` and keep entries with content.
pub fn parse_facts(raw: &str) -> Result<Vec<Fact>, CollabError> {
    let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) else {
        return Ok(Vec::new());
    };
    if end < start {
        return Ok(Vec::new());
    }
    let items: Vec<serde_json::Value> =
        serde_json::from_str(&raw[start..=end]).map_err(|e| CollabError::Malformed(e.to_string()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let content = item.get("content")?.as_str()?.trim();
            if content.is_empty() {
                return None;
            }
            let kind = item.get("type").and_then(|t| t.as_str()).unwrap_or("fact");
            Some(Fact { content: content.to_owned(), kind: kind.to_owned() })
        })
        .collect())
}

fn require(provider: &Option<Arc<dyn LlmProvider>>) -> Result<&Arc<dyn LlmProvider>, CollabError> {
    provider
        .as_ref()
        .ok_or_else(|| CollabError::Unavailable("no classification model configured".into()))
}

pub struct LlmTopicClassifier {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl LlmTopicClassifier {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TopicClassifier for LlmTopicClassifier {
    async fn classify(
        &self,
        user_text: &str,
        agent_reply: &str,
        prior_topic: Option<&str>,
    ) -> Result<Option<String>, CollabError> {
        let provider = require(&self.provider)?;
        let prompt = topic_prompt(user_text, agent_reply, prior_topic);
        let response = provider
            .complete(CompletionRequest::single(None, prompt, TOPIC_MAX_TOKENS, 0.0))
            .await?;
        let topic = parse_topic(&response.content);
        tracing::debug!(topic = topic.as_deref().unwrap_or(""), "topic classified");
        Ok(topic)
    }
}

pub struct LlmFactExtractor {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl LlmFactExtractor {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl FactExtractor for LlmFactExtractor {
    async fn extract(&self, user_text: &str, owner: &str) -> Result<Vec<Fact>, CollabError> {
        let provider = require(&self.provider)?;
        let response = provider
            .complete(CompletionRequest::single(None, facts_prompt(user_text, owner), FACTS_MAX_TOKENS, 0.0))
            .await?;
        parse_facts(&response.content)
    }
}
