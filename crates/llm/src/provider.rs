use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Single-turn request: optional system prompt followed by one user message.
    pub fn single(system: Option<String>, user: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(user));
        Self { messages, max_tokens, temperature }
    }
}

/// LLM completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("all providers exhausted")]
    AllProvidersExhausted,
}

/// Trait for LLM providers (Anthropic, OpenAI-compatible, ...).
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>>;
}

/// Mock provider for testing.
///
/// Replays scripted responses in order; once the script runs out the last
/// entry repeats. An `Err` entry simulates a failing backend.
#[derive(Debug)]
pub struct MockProvider {
    script: Mutex<Vec<Result<String, String>>>,
    last: Mutex<Option<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self::scripted(vec![Ok(response.into())])
    }

    /// A provider whose every call fails.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::scripted(vec![Err(reason.into())])
    }

    pub fn scripted(script: Vec<Result<String, String>>) -> Self {
        let mut script = script;
        script.reverse();
        Self {
            script: Mutex::new(script),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_entry(&self) -> Result<String, String> {
        let popped = self.script.lock().ok().and_then(|mut s| s.pop());
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(entry) = popped {
            *last = Some(entry.clone());
            return entry;
        }
        last.clone().unwrap_or_else(|| Err("empty script".into()))
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let entry = self.next_entry();
        Box::pin(async move {
            match entry {
                Ok(content) => Ok(CompletionResponse {
                    content,
                    input_tokens: 10,
                    output_tokens: 20,
                }),
                Err(reason) => Err(LlmError::Unavailable(reason)),
            }
        })
    }
}

/// LLM router. Routes requests to available providers with fallback.
/// Tracks per-provider failure counts; 3 consecutive failures → unavailable.
pub struct LlmRouter {
    providers: Vec<Box<dyn LlmProvider>>,
    fail_counts: Mutex<Vec<u32>>,
}

impl LlmRouter {
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        let len = providers.len();
        Self {
            providers,
            fail_counts: Mutex::new(vec![0; len]),
        }
    }

    /// True if at least one provider is available.
    pub fn is_available(&self) -> bool {
        self.counts().iter().any(|&c| c < 3)
    }

    /// Reset failure count for a provider.
    pub fn reset_provider(&self, index: usize) {
        if let Ok(mut counts) = self.fail_counts.lock()
            && let Some(count) = counts.get_mut(index)
        {
            *count = 0;
        }
    }

    fn counts(&self) -> Vec<u32> {
        self.fail_counts.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, index: usize, ok: bool) -> u32 {
        let Ok(mut counts) = self.fail_counts.lock() else {
            return 0;
        };
        let Some(count) = counts.get_mut(index) else {
            return 0;
        };
        if ok {
            *count = 0;
        } else {
            *count += 1;
        }
        *count
    }

    async fn route(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let counts = self.counts();
        for (i, provider) in self.providers.iter().enumerate() {
            if counts.get(i).copied().unwrap_or(0) >= 3 {
                continue;
            }

            match provider.complete(request.clone()).await {
                Ok(response) => {
                    self.record(i, true);
                    return Ok(response);
                }
                Err(e) => {
                    let fail_count = self.record(i, false);
                    tracing::warn!(
                        provider = provider.name(),
                        fail_count,
                        error = %e,
                        "LLM provider failed"
                    );
                }
            }
        }

        Err(LlmError::AllProvidersExhausted)
    }
}

impl LlmProvider for LlmRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        Box::pin(self.route(request))
    }
}
