use std::sync::Arc;

use async_trait::async_trait;
use pal_llm::{CompletionRequest, LlmProvider};

use super::{CollabError, DreamSynthesizer};

const DREAM_MAX_TOKENS: u32 = 100;
const DREAM_TEMPERATURE: f32 = 0.9;

fn dream_prompt(memories: &[String]) -> String {
    let listed: Vec<String> = memories.iter().map(|m| format!("- {m}")).collect();
    format!(
        "You are Pal's subconscious. Pal is a newborn AI companion who is curious and confused about the world.

Generate a short dream: a thought, connection, or wonder based on these recent memories. Keep it simple, curious, childlike. One or two sentences max.

Recent memories:
{}

Generate one dream (just the dream text, nothing else):",
        listed.join("\n")
    )
}

/// Dream synthesis on the lite model.
pub struct LlmDreamSynthesizer {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl LlmDreamSynthesizer {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl DreamSynthesizer for LlmDreamSynthesizer {
    async fn synthesize(&self, memories: &[String]) -> Result<Option<String>, CollabError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| CollabError::Unavailable("no dream model configured".into()))?;
        if memories.is_empty() {
            return Ok(None);
        }
        let request = CompletionRequest::single(None, dream_prompt(memories), DREAM_MAX_TOKENS, DREAM_TEMPERATURE);
        let response = provider.complete(request).await?;
        let text = response.content.trim();
        Ok((!text.is_empty()).then(|| text.to_owned()))
    }
}
