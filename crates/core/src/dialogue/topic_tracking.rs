use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::persist::{self, StoreError};
use crate::types::{TopicCard, Understanding};

/// Ledger handle, locked independently of the identity.
pub type SharedTopics = Arc<Mutex<TopicLedger>>;

/// Ledger key for a topic name.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Next understanding level for `card`, one step at most.
pub fn next_understanding(card: &TopicCard) -> Understanding {
    let times = card.times_discussed;
    let memories = card.memories.len();
    match card.understanding {
        Understanding::Surface if times >= 3 || memories >= 2 => Understanding::Basic,
        Understanding::Basic if times >= 10 && memories >= 5 && card.unresolved.is_empty() => {
            Understanding::Familiar
        }
        Understanding::Familiar if times >= 25 && memories >= 10 => Understanding::Knowledgeable,
        current => current,
    }
}

/// Durable map of normalized topic name to topic card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicLedger {
    topics: BTreeMap<String, TopicCard>,
}

impl TopicLedger {
    pub fn get(&self, name: &str) -> Option<&TopicCard> {
        self.topics.get(&normalize(name))
    }

    /// Blank names have no card.
    pub fn get_or_create(&mut self, name: &str, now: DateTime<Utc>) -> Option<&mut TopicCard> {
        let key = normalize(name);
        if key.is_empty() {
            return None;
        }
        let card = self.topics.entry(key).or_insert_with(|| {
            tracing::debug!(topic = name.trim(), "topic created");
            TopicCard {
                display_name: name.trim().to_owned(),
                first_mentioned: now,
                last_discussed: now,
                ..TopicCard::default()
            }
        });
        Some(card)
    }

    /// Count one more discussion (a new card starts at one) and re-evaluate
    /// understanding.
    pub fn discuss(&mut self, name: &str, now: DateTime<Utc>) -> Option<Understanding> {
        let key = normalize(name);
        let existed = self.topics.contains_key(&key);
        let card = self.get_or_create(name, now)?;
        if existed {
            card.times_discussed += 1;
            card.last_discussed = now;
        }
        Some(Self::bump(card))
    }

    pub fn link_memory(&mut self, name: &str, memory_id: &str, now: DateTime<Utc>) {
        if let Some(card) = self.get_or_create(name, now)
            && !card.memories.iter().any(|m| m == memory_id)
        {
            card.memories.push(memory_id.to_owned());
        }
    }

    pub fn add_unresolved(&mut self, name: &str, question: &str, now: DateTime<Utc>) {
        if let Some(card) = self.get_or_create(name, now)
            && !card.unresolved.iter().any(|q| q == question)
        {
            card.unresolved.push(question.to_owned());
        }
    }

    /// Drop an open question. Returns whether it was open.
    pub fn resolve(&mut self, name: &str, question: &str) -> bool {
        let Some(card) = self.topics.get_mut(&normalize(name)) else {
            return false;
        };
        let Some(pos) = card.unresolved.iter().position(|q| q == question) else {
            return false;
        };
        card.unresolved.remove(pos);
        Self::bump(card);
        true
    }

    pub fn bump_understanding(&mut self, name: &str) -> Option<Understanding> {
        self.topics.get_mut(&normalize(name)).map(Self::bump)
    }

    fn bump(card: &mut TopicCard) -> Understanding {
        let next = next_understanding(card);
        if next > card.understanding {
            tracing::info!(topic = %card.display_name, from = card.understanding.as_str(), to = next.as_str(), "understanding advanced");
            card.understanding = next;
        }
        card.understanding
    }

    pub fn topics_with_unresolved(&self) -> Vec<&str> {
        self.topics
            .iter()
            .filter(|(_, c)| !c.unresolved.is_empty())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn unresolved_count(&self) -> usize {
        self.topics.values().map(|c| c.unresolved.len()).sum()
    }

    pub fn summary(&self, name: &str) -> Option<String> {
        let card = self.get(name)?;
        Some(format!(
            "{}: discussed {} times, understanding: {}, {} memories, {} unresolved questions",
            card.display_name,
            card.times_discussed,
            card.understanding.as_str(),
            card.memories.len(),
            card.unresolved.len()
        ))
    }

    /// Known topics whose name appears in `message`.
    pub fn mentioned_in(&self, message: &str) -> Vec<&str> {
        let lower = message.to_lowercase();
        self.topics
            .keys()
            .filter(|k| lower.contains(k.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Snapshot file holding the topic ledger.
#[derive(Debug, Clone)]
pub struct TopicStore {
    path: PathBuf,
}

impl TopicStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_create(&self) -> Result<TopicLedger, StoreError> {
        let (ledger, existed): (TopicLedger, bool) = persist::load_or_default(&self.path)?;
        if !existed {
            self.save(&ledger)?;
        }
        tracing::debug!(topics = ledger.len(), "topic ledger loaded");
        Ok(ledger)
    }

    pub fn save(&self, ledger: &TopicLedger) -> Result<(), StoreError> {
        persist::write_snapshot(&self.path, ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn names_are_normalized() {
        let mut ledger = TopicLedger::default();
        ledger.discuss("  Sleep ", now());
        ledger.discuss("sleep", now());
        assert_eq!(ledger.len(), 1);
        let card = ledger.get("SLEEP").unwrap();
        assert_eq!(card.display_name, "Sleep");
        assert_eq!(card.times_discussed, 2);
    }

    #[test]
    fn blank_names_ignored() {
        let mut ledger = TopicLedger::default();
        assert_eq!(ledger.discuss("   ", now()), None);
        assert!(ledger.is_empty());
    }

    #[test]
    fn link_and_unresolved_are_idempotent() {
        let mut ledger = TopicLedger::default();
        ledger.link_memory("rain", "m1", now());
        ledger.link_memory("rain", "m1", now());
        ledger.add_unresolved("rain", "why wet?", now());
        ledger.add_unresolved("rain", "why wet?", now());
        let card = ledger.get("rain").unwrap();
        assert_eq!(card.memories, vec!["m1"]);
        assert_eq!(card.unresolved, vec!["why wet?"]);
        assert_eq!(ledger.topics_with_unresolved(), vec!["rain"]);
        assert_eq!(ledger.unresolved_count(), 1);
    }

    #[test]
    fn understanding_advances_one_step_per_event() {
        let mut ledger = TopicLedger::default();
        ledger.discuss("music", now());
        ledger.discuss("music", now());
        assert_eq!(ledger.get("music").unwrap().understanding, Understanding::Surface);
        assert_eq!(ledger.discuss("music", now()), Some(Understanding::Basic));

        for i in 0..5 {
            ledger.link_memory("music", &format!("m{i}"), now());
        }
        ledger.add_unresolved("music", "what is a note?", now());
        for _ in 0..7 {
            ledger.discuss("music", now());
        }
        // open question blocks familiar
        assert_eq!(ledger.get("music").unwrap().understanding, Understanding::Basic);
        assert!(ledger.resolve("music", "what is a note?"));
        assert_eq!(ledger.get("music").unwrap().understanding, Understanding::Familiar);
        assert!(!ledger.resolve("music", "what is a note?"));
    }

    #[test]
    fn understanding_never_regresses() {
        let mut ledger = TopicLedger::default();
        let mut last = Understanding::Surface;
        for i in 0..40usize {
            ledger.discuss("dogs", now());
            if i % 3 == 0 {
                ledger.link_memory("dogs", &format!("m{i}"), now());
            }
            if i % 4 == 0 {
                ledger.add_unresolved("dogs", &format!("q{i}"), now());
            }
            if i % 5 == 0 {
                ledger.resolve("dogs", &format!("q{}", i.saturating_sub(4)));
            }
            let current = ledger.get("dogs").unwrap().understanding;
            assert!(current >= last);
            last = current;
        }
    }

    #[test]
    fn summary_and_mentions() {
        let mut ledger = TopicLedger::default();
        ledger.discuss("Pizza", now());
        ledger.link_memory("pizza", "m1", now());
        assert_eq!(
            ledger.summary("pizza").unwrap(),
            "Pizza: discussed 1 times, understanding: surface, 1 memories, 0 unresolved questions"
        );
        assert_eq!(ledger.mentioned_in("I ate PIZZA today"), vec!["pizza"]);
        assert!(ledger.mentioned_in("salad").is_empty());
        assert!(ledger.summary("salad").is_none());
    }

    #[test]
    fn store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TopicStore::new(dir.path().join("topics.json"));
        let mut ledger = store.load_or_create().unwrap();
        assert!(store.path().exists());
        ledger.discuss("sleep", now());
        store.save(&ledger).unwrap();
        assert_eq!(store.load_or_create().unwrap(), ledger);
    }

    #[test]
    fn loads_ledger_with_naive_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topics.json");
        std::fs::write(
            &path,
            r#"{"gardening": {
                "display_name": "Gardening",
                "first_mentioned": "2024-01-02T10:00:00.123456",
                "last_discussed": "2024-01-03T09:30:00",
                "times_discussed": 4,
                "memories": ["m1"],
                "understanding": "basic",
                "unresolved": ["What do you grow?"]
            }}"#,
        )
        .unwrap();

        let ledger = TopicStore::new(&path).load_or_create().unwrap();
        let card = ledger.get("gardening").unwrap();
        assert_eq!(card.times_discussed, 4);
        assert_eq!(card.understanding, Understanding::Basic);
        assert_eq!(card.unresolved, ["What do you grow?"]);
        assert_eq!(
            card.first_mentioned,
            persist::lenient::parse_timestamp("2024-01-02T10:00:00.123456").unwrap()
        );
        assert!(!dir.path().join("topics.json.corrupt").exists());
    }
}
