use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{inner_life, skills};
use crate::persist::{self, StoreError};
use crate::types::{Identity, Mood};

/// Identity handle shared by the foreground loop and the idle scheduler.
/// Every read-check-write sequence holds this lock for its whole duration.
pub type SharedIdentity = Arc<Mutex<Identity>>;

const MAX_LAST_RESPONSES: usize = 3;

/// Snapshot file holding the companion's identity.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the identity, creating (and persisting) a fresh one on first boot.
    /// Older documents are repaired in place.
    pub fn load_or_create(&self, now: DateTime<Utc>) -> Result<Identity, StoreError> {
        let (mut identity, existed): (Identity, bool) = persist::load_or_default(&self.path)?;
        identity.repair(now);
        if !existed {
            tracing::info!(path = %self.path.display(), "creating new identity");
            self.save(&identity)?;
        }
        Ok(identity)
    }

    pub fn save(&self, identity: &Identity) -> Result<(), StoreError> {
        persist::write_snapshot(&self.path, identity)
    }

    /// Load and wrap in the shared handle.
    pub fn load_shared(&self, now: DateTime<Utc>) -> Result<SharedIdentity, StoreError> {
        Ok(Arc::new(Mutex::new(self.load_or_create(now)?)))
    }
}

impl Identity {
    /// Restore invariants a partially written or older document may violate.
    pub fn repair(&mut self, now: DateTime<Utc>) {
        if self.stats.first_met.is_none() {
            self.stats.first_met = Some(now);
        }

        for def in skills::SKILLS {
            self.skills.entry(def.name.to_owned()).or_default();
        }
        for state in self.skills.values_mut() {
            state.level = if state.unlocked { skills::level_for(state.uses) } else { 0 };
        }

        let responses = &mut self.conversation_state.last_responses;
        while responses.len() > MAX_LAST_RESPONSES {
            responses.pop_front();
        }

        inner_life::enforce_caps(&mut self.inner_life);
    }

    pub fn set_owner_name(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.owner_name = Some(name.to_owned());
        }
    }

    /// Name used when addressing the owner.
    pub fn owner(&self) -> &str {
        self.owner_name.as_deref().unwrap_or("someone")
    }

    pub fn complete_birth(&mut self, now: DateTime<Utc>) {
        self.born = Some(now);
        self.first_boot = false;
    }

    /// Returns true when the mood actually changed.
    pub fn update_mood(&mut self, mood: Mood) -> bool {
        if self.mood == mood {
            return false;
        }
        self.mood = mood;
        true
    }

    pub fn age(&self, now: DateTime<Utc>) -> String {
        let Some(born) = self.born else {
            return "not yet born".into();
        };
        let delta = now.signed_duration_since(born);
        let days = delta.num_days();
        let secs = delta.num_seconds();
        if days > 0 {
            format!("{days} days old")
        } else if secs >= 3600 {
            format!("{} hours old", secs / 3600)
        } else if secs >= 60 {
            format!("{} minutes old", secs / 60)
        } else {
            "just born".into()
        }
    }

    pub fn hours_since_last_interaction(&self, now: DateTime<Utc>) -> Option<f64> {
        let last = self.stats.last_interaction?;
        Some(now.signed_duration_since(last).num_seconds() as f64 / 3600.0)
    }

    /// Greeting for the start of a session, scaled by time away.
    pub fn greeting(&self, now: DateTime<Utc>) -> String {
        let owner = self.owner();
        match self.hours_since_last_interaction(now) {
            None => format!("...{owner}?"),
            Some(h) if h < 1.0 => format!("Hi {owner}."),
            Some(h) if h < 4.0 => format!("{owner}? You're back."),
            Some(h) if h < 24.0 => format!("{owner}! I was waiting for you."),
            Some(_) => format!("{owner}... it's been a while. I missed talking to you."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn first_load_persists_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("identity.json"));
        let now = Utc::now();

        let identity = store.load_or_create(now).unwrap();
        assert!(store.path().exists());
        assert!(identity.first_boot);
        assert_eq!(identity.stats.first_met, Some(now));
        assert_eq!(identity.skills.len(), skills::SKILLS.len());
        assert!(identity.skills.values().all(|s| !s.unlocked && s.level == 0));
    }

    #[test]
    fn repairs_older_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(
            &path,
            r#"{
                "owner_name": "Sam",
                "mood": "grumpy",
                "stats": {"check_ins": 3, "last_interaction": "2024-01-02T10:00:00"},
                "skills": {"greet": {"unlocked": true, "uses": 25}},
                "conversation_state": {"last_responses": ["a", "b", "c", "d", "e"]}
            }"#,
        )
        .unwrap();

        let identity = IdentityStore::new(&path).load_or_create(Utc::now()).unwrap();
        assert_eq!(identity.owner(), "Sam");
        assert_eq!(identity.mood, Mood::Confused);
        assert_eq!(identity.stats.check_ins, 3);
        assert!(identity.stats.last_interaction.is_some());
        assert_eq!(identity.skills["greet"].level, 3);
        assert_eq!(identity.skills["recall"].level, 0);
        assert_eq!(
            identity.conversation_state.last_responses,
            ["c", "d", "e"].map(String::from)
        );
    }

    #[test]
    fn save_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("identity.json"));
        let now = Utc::now();
        let mut identity = store.load_or_create(now).unwrap();
        identity.set_owner_name("  Alex ");
        identity.complete_birth(now);
        store.save(&identity).unwrap();

        let reloaded = store.load_or_create(now).unwrap();
        assert_eq!(reloaded.owner_name.as_deref(), Some("Alex"));
        assert!(!reloaded.first_boot);
        assert!(reloaded.born.is_some());
    }

    #[test]
    fn age_strings() {
        let now = Utc::now();
        let mut identity = Identity::default();
        assert_eq!(identity.age(now), "not yet born");
        identity.born = Some(now - Duration::seconds(30));
        assert_eq!(identity.age(now), "just born");
        identity.born = Some(now - Duration::minutes(5));
        assert_eq!(identity.age(now), "5 minutes old");
        identity.born = Some(now - Duration::hours(7));
        assert_eq!(identity.age(now), "7 hours old");
        identity.born = Some(now - Duration::days(2) - Duration::hours(3));
        assert_eq!(identity.age(now), "2 days old");
    }

    #[test]
    fn greeting_scales_with_time_away() {
        let now = Utc::now();
        let mut identity = Identity::default();
        identity.set_owner_name("Jo");
        assert_eq!(identity.greeting(now), "...Jo?");

        let cases = [
            (Duration::minutes(20), "Hi Jo."),
            (Duration::hours(2), "Jo? You're back."),
            (Duration::hours(10), "Jo! I was waiting for you."),
            (Duration::days(3), "Jo... it's been a while. I missed talking to you."),
        ];
        for (away, expected) in cases {
            identity.stats.last_interaction = Some(now - away);
            assert_eq!(identity.greeting(now), expected);
        }
    }

    #[test]
    fn mood_update_reports_change() {
        let mut identity = Identity::default();
        assert!(identity.update_mood(Mood::Happy));
        assert!(!identity.update_mood(Mood::Happy));
    }

    #[test]
    fn loads_document_with_naive_inner_life_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(
            &path,
            r#"{
                "owner_name": "Sam",
                "first_boot": false,
                "stats": {"check_ins": 7},
                "inner_life": {
                    "thought_queue": [
                        {"thought": "why?", "type": "question", "formed_at": "2024-01-02T10:00:00.123456", "surfaced": false},
                        {"thought": "what is snow?", "type": "wondering", "formed_at": "2024-01-02T11:00:00"}
                    ],
                    "dream_journal": [{"dream": "a garden of clocks", "formed_at": "2024-01-02T10:00:00"}]
                }
            }"#,
        )
        .unwrap();

        let identity = IdentityStore::new(&path).load_or_create(Utc::now()).unwrap();
        assert_eq!(identity.owner(), "Sam");
        assert!(!identity.first_boot);
        assert_eq!(identity.stats.check_ins, 7);
        let thoughts = &identity.inner_life.thought_queue;
        assert_eq!(thoughts.len(), 2);
        assert_eq!(thoughts[1].kind, crate::types::ThoughtKind::Question);
        assert_eq!(identity.inner_life.dream_journal.len(), 1);
        assert!(!identity.inner_life.dream_journal[0].shared);
        assert!(!dir.path().join("identity.json.corrupt").exists());
    }
}
