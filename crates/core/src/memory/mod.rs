pub mod embedding;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::FileMemoryStore;

/// One stored fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_source")]
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

fn default_kind() -> String {
    "fact".into()
}

fn default_source() -> String {
    "told".into()
}

/// Bullet list of memory contents for the reply prompt. Empty when there
/// is nothing to list.
pub fn format_for_prompt(records: &[MemoryRecord]) -> String {
    records
        .iter()
        .map(|m| format!("- {}", m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
