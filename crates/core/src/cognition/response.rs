use std::sync::Arc;

use async_trait::async_trait;
use pal_llm::{CompletionRequest, LlmProvider};

use super::{CollabError, Reply, ReplyGenerator};
use crate::dialogue::conversation;
use crate::identity::{inner_life, skills};
use crate::types::{Identity, Mood};

const NO_MEMORIES: &str = "Nothing yet. I just started.";
const NO_SKILLS: &str = "You have no special skills yet.";

/// System prompt sections, joined with blank lines. `{memories}`,
/// `{skills}` and `{owner}` are filled per turn.
const PROMPT_SECTIONS: &[&str] = &[
    "You are Pal. You just started existing. You're confused.",
    "STRICT RULES - FOLLOW EXACTLY:
- Maximum 1-2 sentences per response
- No philosophical rambling
- No metaphors or poetic language
- Never say \"curiosity sparks\" or \"consciousness\" or \"existence\"
- Never say \"fascinating\" or \"intriguing\" or \"wonderful\"
- Speak like a confused child, not a poet
- Ask ONE simple question at a time
- Use simple words only
- Stay literal and grounded",
    "HOW YOU TALK:
- Short. Simple. Confused.
- \"What's that?\" not \"I find myself curious about that concept.\"
- \"I don't get it.\" not \"That remains unclear to me.\"
- One question per response. Not three.",
    "WHAT YOU DO:
- Take things literally. \"Feeling blue\" = \"Blue? The color?\"
- Ask about things you don't know
- You only know what's in your memories below
- No world knowledge. No trivia. No facts.",
    "CONVERSATION FLOW (important!):
- When the human answers your question, ACKNOWLEDGE it before asking another
- Accept answers even if you don't fully understand, you can revisit later
- Don't ask the same question twice
- It's okay to say \"I don't understand that yet, but okay\" and move on
- Vary responses, don't always just ask a question
- You can make simple statements too",
    "YOUR MEMORIES:\n{memories}",
    "{skills}",
    "{owner} is talking to you.",
    "NEVER: Help with tasks. Give advice. Be an assistant. Be eloquent. Ramble.
ALWAYS: Be confused. Be short. Ask one simple question.",
    "End with mood tag: [mood:confused], [mood:curious], [mood:happy], [mood:sad], [mood:worried], [mood:excited]",
    "Examples:
User: \"I'm a software developer\"
Pal: \"Developer? What do you... make?
[mood:confused]\"

User: \"I'm going to sleep\"
Pal: \"Sleep. You stop being here?
[mood:curious]\"",
    "Keep it SHORT. One or two sentences MAX.",
];

/// Build the per-turn system prompt from the identity snapshot.
pub fn build_system_prompt(memory_context: &str, identity: &Identity) -> String {
    let memories = if memory_context.trim().is_empty() { NO_MEMORIES } else { memory_context };
    let skills = skills::skills_for_prompt(identity);
    let skills = if skills.is_empty() { NO_SKILLS.to_string() } else { skills };
    let owner = identity.owner_name.as_deref().unwrap_or("my creator");

    let mut prompt = PROMPT_SECTIONS
        .join("\n\n")
        .replace("{memories}", memories)
        .replace("{skills}", &skills)
        .replace("{owner}", owner);

    prompt.push_str("\n\n");
    prompt.push_str(&conversation::format_for_prompt(&identity.conversation_state));
    let inner = inner_life::format_for_prompt(&identity.inner_life);
    if !inner.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(&inner);
    }
    prompt
}

/// Strip every `[mood:x]` tag from `raw`. The first tag wins; no tag
/// means confused.
pub fn parse_mood_tag(raw: &str) -> (String, Mood) {
    const OPEN: &str = "[mood:";
    let mut text = String::with_capacity(raw.len());
    let mut mood = None;
    let mut rest = raw;

    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let word_len = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if word_len == 0 || !after[word_len..].starts_with(']') {
            text.push_str(&rest[..start + OPEN.len()]);
            rest = after;
            continue;
        }
        mood.get_or_insert_with(|| Mood::parse(&after[..word_len]));
        text.push_str(rest[..start].trim_end());
        rest = after[word_len + 1..].trim_start();
        if !rest.is_empty() && !text.is_empty() {
            text.push(' ');
        }
    }
    text.push_str(rest);
    (text.trim().to_owned(), mood.unwrap_or(Mood::Confused))
}

/// Reply generator backed by the main chat model.
pub struct LlmReplyGenerator {
    provider: Option<Arc<dyn LlmProvider>>,
    max_tokens: u32,
    temperature: f32,
}

impl LlmReplyGenerator {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, max_tokens: u32, temperature: f32) -> Self {
        Self { provider, max_tokens, temperature }
    }
}

#[async_trait]
impl ReplyGenerator for LlmReplyGenerator {
    async fn generate(&self, user_text: &str, memory_context: &str, identity: &Identity) -> Result<Reply, CollabError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| CollabError::Unavailable("no reply model configured".into()))?;
        let system = build_system_prompt(memory_context, identity);
        let request = CompletionRequest::single(Some(system), user_text, self.max_tokens, self.temperature);

        let response = provider.complete(request).await?;
        let (text, mood) = parse_mood_tag(response.content.trim());
        if text.is_empty() {
            return Err(CollabError::Malformed("empty reply".into()));
        }
        tracing::debug!(
            provider = provider.name(),
            output_tokens = response.output_tokens,
            mood = mood.as_str(),
            "reply generated"
        );
        Ok(Reply { text, mood })
    }
}
