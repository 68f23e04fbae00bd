//! Collaborators the engine consumes: reply generation, topic
//! classification, dream synthesis, fact extraction and memory storage.
//!
//! Each is a trait so tests and alternative backends can swap them out.
//! The LLM-backed implementations live in the submodules.

use async_trait::async_trait;
use pal_llm::LlmError;

use crate::memory::MemoryRecord;
use crate::persist::StoreError;
use crate::types::{Identity, Mood};

pub mod dreaming;
pub mod perception;
pub mod response;

pub use dreaming::LlmDreamSynthesizer;
pub use perception::{LlmFactExtractor, LlmTopicClassifier};
pub use response::LlmReplyGenerator;

#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("malformed collaborator output: {0}")]
    Malformed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A generated reply with the mood it was said in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub mood: Mood,
}

/// A fact pulled out of a user message, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub content: String,
    pub kind: String,
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, user_text: &str, memory_context: &str, identity: &Identity) -> Result<Reply, CollabError>;
}

#[async_trait]
pub trait TopicClassifier: Send + Sync {
    /// Short topic phrase for the exchange, or `None` when nothing fits.
    async fn classify(
        &self,
        user_text: &str,
        agent_reply: &str,
        prior_topic: Option<&str>,
    ) -> Result<Option<String>, CollabError>;
}

#[async_trait]
pub trait DreamSynthesizer: Send + Sync {
    async fn synthesize(&self, memories: &[String]) -> Result<Option<String>, CollabError>;
}

#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(&self, user_text: &str, owner: &str) -> Result<Vec<Fact>, CollabError>;
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Fact texts, newest first.
    async fn recent_facts(&self, limit: usize) -> Result<Vec<String>, CollabError>;
    /// Records most similar to `query`, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryRecord>, CollabError>;
    /// Store a fact and return its id.
    async fn store(&self, fact: &str, kind: &str, source: &str) -> Result<String, CollabError>;
    async fn count(&self) -> Result<usize, CollabError>;
}
