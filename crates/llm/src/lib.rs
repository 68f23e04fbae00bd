//! LLM provider layer for pal.
//!
//! The companion core only ever talks to [`provider::LlmProvider`]; concrete
//! HTTP backends live in [`http`].

pub mod http;
pub mod provider;

pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmError, LlmProvider, LlmRouter,
    MockProvider, Role,
};
