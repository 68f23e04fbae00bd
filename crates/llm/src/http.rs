//! Remote chat backends for pal.
//!
//! Pal only ever sends short text prompts (a persona reply, a topic label,
//! a dream) and reads back plain text. Two wire dialects cover every
//! backend we talk to: the OpenAI-style `/chat/completions` body, which
//! Gemini, DeepSeek and local servers also speak, and Anthropic's
//! `/v1/messages` body.

use crate::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmError, LlmProvider, Role};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

const API_KEY_VAR: &str = "PAL_LLM_API_KEY";
const BASE_URL_VAR: &str = "PAL_LLM_BASE_URL";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Backend family, picked from the model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    DeepSeek,
    /// Anything else is assumed to speak the OpenAI dialect.
    Unknown,
}

const MODEL_PREFIXES: &[(&str, ProviderKind)] = &[
    ("gpt-", ProviderKind::OpenAi),
    ("o1-", ProviderKind::OpenAi),
    ("o3-", ProviderKind::OpenAi),
    ("o4-", ProviderKind::OpenAi),
    ("claude-", ProviderKind::Anthropic),
    ("gemini-", ProviderKind::Google),
    ("deepseek-", ProviderKind::DeepSeek),
];

impl ProviderKind {
    pub fn from_model(model: &str) -> Self {
        let model = model.to_lowercase();
        MODEL_PREFIXES
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix))
            .map_or(Self::Unknown, |(_, kind)| *kind)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::DeepSeek => "deepseek",
            Self::Unknown => "unknown",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi | Self::Unknown => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::DeepSeek => "https://api.deepseek.com",
        }
    }
}

// chat/completions dialect

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<Turn<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for Turn<'a> {
    fn from(m: &'a ChatMessage) -> Self {
        Self { role: role_name(m.role), content: &m.content }
    }
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// messages dialect

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Turn<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ReplyBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplyBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// One configured remote model.
pub struct HttpProvider {
    kind: ProviderKind,
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    /// `base_url` overrides the backend's public endpoint, e.g. for a local
    /// server. A trailing slash is tolerated.
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        let kind = ProviderKind::from_model(&model);
        let base_url = base_url.as_deref().unwrap_or(kind.default_base_url()).trim_end_matches('/').to_owned();
        Self { kind, model, client: reqwest::Client::new(), base_url, api_key }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        match self.kind {
            ProviderKind::Anthropic => format!("{}/v1/messages", self.base_url),
            _ => format!("{}/chat/completions", self.base_url),
        }
    }

    async fn chat(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatBody {
            model: &self.model,
            messages: request.messages.iter().map(Turn::from).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let builder = self.client.post(self.endpoint()).bearer_auth(&self.api_key).json(&body);
        let reply: ChatReply = send(builder).await?;

        let content = reply.choices.into_iter().next().and_then(|c| c.message.content).unwrap_or_default();
        let (input_tokens, output_tokens) = reply.usage.map_or((0, 0), |u| (u.prompt_tokens, u.completion_tokens));
        Ok(CompletionResponse { content, input_tokens, output_tokens })
    }

    async fn messages(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (system, turns) = split_system(&request.messages);
        let body = MessagesBody {
            model: &self.model,
            max_tokens: request.max_tokens,
            system,
            messages: turns,
            temperature: request.temperature,
        };
        let builder = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        let reply: MessagesReply = send(builder).await?;

        let content = reply
            .content
            .into_iter()
            .filter_map(|block| match block {
                ReplyBlock::Text { text } => Some(text),
                ReplyBlock::Other => None,
            })
            .collect::<String>();
        let (input_tokens, output_tokens) = reply.usage.map_or((0, 0), |u| (u.input_tokens, u.output_tokens));
        Ok(CompletionResponse { content, input_tokens, output_tokens })
    }
}

impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        self.kind.label()
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        match self.kind {
            ProviderKind::Anthropic => Box::pin(self.messages(request)),
            _ => Box::pin(self.chat(request)),
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// The messages dialect wants system text as a top-level field. Several
/// system messages are joined in order.
fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<Turn<'_>>) {
    let (system, rest): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
        messages.iter().partition(|m| m.role == Role::System);
    let system = (!system.is_empty())
        .then(|| system.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n\n"));
    (system, rest.into_iter().map(Turn::from).collect())
}

async fn send<T: DeserializeOwned>(builder: reqwest::RequestBuilder) -> Result<T, LlmError> {
    let resp = builder.send().await.map_err(transport_error)?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    resp.json().await.map_err(|e| LlmError::RequestFailed(format!("bad response body: {e}")))
}

/// Could not reach the backend at all; the router moves on to the next one.
fn transport_error(e: reqwest::Error) -> LlmError {
    if e.is_connect() || e.is_timeout() {
        LlmError::Unavailable(e.to_string())
    } else {
        LlmError::RequestFailed(e.to_string())
    }
}

fn status_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    match status.as_u16() {
        429 => LlmError::RateLimited,
        500..=599 => LlmError::Unavailable(format!("{status}: {body}")),
        _ => LlmError::RequestFailed(format!("{status}: {body}")),
    }
}

/// Provider for the model named by `model_var`, sharing `PAL_LLM_API_KEY`
/// and the optional `PAL_LLM_BASE_URL`. `None` when model or key is unset.
pub fn from_env_with_model_var(model_var: &str) -> Option<HttpProvider> {
    let model = std::env::var(model_var).ok().filter(|m| !m.trim().is_empty())?;
    let api_key = std::env::var(API_KEY_VAR).ok()?;
    let base_url = std::env::var(BASE_URL_VAR).ok();
    Some(HttpProvider::new(model, api_key, base_url))
}

/// The model pal talks with: `PAL_LLM_MODEL`.
pub fn from_env() -> Option<HttpProvider> {
    from_env_with_model_var("PAL_LLM_MODEL")
}

/// The small model for topic labels, fact extraction and dreams:
/// `PAL_LLM_LITE_MODEL`.
pub fn lite_from_env() -> Option<HttpProvider> {
    from_env_with_model_var("PAL_LLM_LITE_MODEL")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_pick_the_backend() {
        let cases = [
            ("gpt-4o", ProviderKind::OpenAi),
            ("o3-mini", ProviderKind::OpenAi),
            ("Claude-3-opus", ProviderKind::Anthropic),
            ("gemini-2.0-flash", ProviderKind::Google),
            ("DeepSeek-chat", ProviderKind::DeepSeek),
            ("llama-3", ProviderKind::Unknown),
        ];
        for (model, kind) in cases {
            assert_eq!(ProviderKind::from_model(model), kind, "{model}");
        }
    }

    #[test]
    fn endpoints() {
        let claude = HttpProvider::new("claude-haiku".into(), "k".into(), None);
        assert_eq!(claude.endpoint(), "https://api.anthropic.com/v1/messages");
        assert_eq!(claude.name(), "anthropic");

        let local = HttpProvider::new("llama-3".into(), "k".into(), Some("http://localhost:8080/v1/".into()));
        assert_eq!(local.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(local.name(), "unknown");
        assert_eq!(local.model(), "llama-3");
    }

    #[test]
    fn system_messages_are_lifted_and_joined() {
        let messages = vec![
            ChatMessage::system("You are Pal."),
            ChatMessage::system("Mood: curious."),
            ChatMessage::user("hi"),
        ];
        let (system, turns) = split_system(&messages);
        assert_eq!(system.as_deref(), Some("You are Pal.\n\nMood: curious."));
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, "user");

        let (system, turns) = split_system(&messages[2..]);
        assert!(system.is_none());
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn status_codes_map_to_errors() {
        use reqwest::StatusCode;
        assert!(matches!(status_error(StatusCode::TOO_MANY_REQUESTS, ""), LlmError::RateLimited));
        assert!(matches!(status_error(StatusCode::BAD_GATEWAY, "down"), LlmError::Unavailable(_)));
        assert!(matches!(status_error(StatusCode::UNAUTHORIZED, "no key"), LlmError::RequestFailed(_)));
    }

    #[test]
    fn reply_bodies_keep_only_text() {
        let raw = r#"{"content":[{"type":"text","text":"Hi"},{"type":"thinking","thinking":"..."}],"usage":{"input_tokens":3,"output_tokens":1}}"#;
        let parsed: MessagesReply = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed.content[0], ReplyBlock::Text { .. }));
        assert!(matches!(parsed.content[1], ReplyBlock::Other));

        let raw = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let parsed: ChatReply = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
        assert!(parsed.usage.is_none());
    }
}
