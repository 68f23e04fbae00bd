use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{MemoryRecord, embedding};
use crate::cognition::{CollabError, MemoryStore};
use crate::persist::{self, StoreError};

/// Memory records kept in one local snapshot file, searched by cosine
/// similarity over hashed bag-of-words embeddings.
#[derive(Debug)]
pub struct FileMemoryStore {
    path: PathBuf,
    records: Mutex<Vec<MemoryRecord>>,
}

impl FileMemoryStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (mut records, _): (Vec<MemoryRecord>, bool) = persist::load_or_default(&path)?;
        for record in &mut records {
            if record.embedding.len() != embedding::EMBED_DIM {
                record.embedding = embedding::generate(&record.content);
            }
        }
        tracing::info!(path = %path.display(), count = records.len(), "memory store opened");
        Ok(Self { path, records: Mutex::new(records) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn recent_facts(&self, limit: usize) -> Result<Vec<String>, CollabError> {
        let records = self.records.lock().await;
        let mut newest: Vec<&MemoryRecord> = records.iter().collect();
        newest.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(newest.into_iter().take(limit).map(|r| r.content.clone()).collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryRecord>, CollabError> {
        let records = self.records.lock().await;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = embedding::generate(query);
        let mut scored: Vec<(f32, &MemoryRecord)> = records
            .iter()
            .rev()
            .map(|r| (embedding::cosine(&query_vec, &r.embedding), r))
            .collect();
        // stable: equal scores keep newest first
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let hits: Vec<MemoryRecord> = scored.into_iter().take(limit).map(|(_, r)| r.clone()).collect();
        tracing::debug!(hits = hits.len(), "memory search");
        Ok(hits)
    }

    async fn store(&self, fact: &str, kind: &str, source: &str) -> Result<String, CollabError> {
        let record = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            content: fact.to_owned(),
            kind: kind.to_owned(),
            source: source.to_owned(),
            timestamp: Utc::now(),
            embedding: embedding::generate(fact),
        };
        let id = record.id.clone();

        let mut records = self.records.lock().await;
        records.push(record);
        if let Err(e) = persist::write_snapshot(&self.path, &*records) {
            records.pop();
            return Err(e.into());
        }
        tracing::debug!(memory_id = %id, kind, "memory stored");
        Ok(id)
    }

    async fn count(&self) -> Result<usize, CollabError> {
        Ok(self.records.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_search_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.json");
        let store = FileMemoryStore::open(&path).unwrap();
        assert!(store.search("anything", 5).await.unwrap().is_empty());

        let tea = store.store("Sam likes green tea", "preference", "told").await.unwrap();
        store.store("The weather was cold", "fact", "told").await.unwrap();
        store.store("Sam has a dog named Rex", "about_owner", "told").await.unwrap();

        let hits = store.search("does Sam like tea", 1).await.unwrap();
        assert_eq!(hits[0].id, tea);
        assert_eq!(hits[0].kind, "preference");

        let reopened = FileMemoryStore::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 3);
        let recent = reopened.recent_facts(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent.contains(&"Sam has a dog named Rex".to_string()));
    }

    #[tokio::test]
    async fn recent_facts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMemoryStore::open(dir.path().join("m.json")).unwrap();
        store.store("first", "fact", "told").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.store("second", "fact", "told").await.unwrap();
        assert_eq!(store.recent_facts(10).await.unwrap(), vec!["second", "first"]);
    }

    #[test]
    fn missing_embeddings_rebuilt_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(
            &path,
            r#"[{"id": "a", "content": "Sam likes tea", "timestamp": "2025-01-01T00:00:00Z"}]"#,
        )
        .unwrap();
        let store = FileMemoryStore::open(&path).unwrap();
        let records = store.records.try_lock().unwrap();
        assert_eq!(records[0].embedding.len(), embedding::EMBED_DIM);
        assert_eq!(records[0].source, "told");
        assert_eq!(records[0].kind, "fact");
    }
}
