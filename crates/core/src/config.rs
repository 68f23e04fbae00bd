use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::persist::{self, StoreError};

/// All pal runtime parameters. Loaded from `config.json` in the data dir.
/// First boot writes defaults; subsequent boots read existing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PalCfg {
    // idle scheduler
    pub thought_idle_minutes: u64,
    pub dream_idle_minutes: u64,
    pub idle_poll_secs: u64,
    pub scheduler_stop_timeout_ms: u64,

    // sessions
    pub session_reset_hours: u64,
    pub dream_share_hours: u64,

    // memory retrieval
    pub memory_search_limit: usize,
    pub dream_memory_limit: usize,

    // scheduler -> foreground notifications
    pub notification_buffer: usize,

    // reply generation
    pub reply_max_tokens: u32,
    pub reply_temperature: f32,
}

impl Default for PalCfg {
    fn default() -> Self {
        Self {
            thought_idle_minutes: 10,
            dream_idle_minutes: 30,
            idle_poll_secs: 60,
            scheduler_stop_timeout_ms: 2000,
            session_reset_hours: 4,
            dream_share_hours: 4,
            memory_search_limit: 5,
            dream_memory_limit: 10,
            notification_buffer: 16,
            reply_max_tokens: 100,
            reply_temperature: 0.7,
        }
    }
}

/// One row of the on-disk config document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigEntry {
    value: String,
    #[serde(default)]
    description: String,
}

impl PalCfg {
    /// Load config from `path`. Keys missing from the file are seeded with
    /// their defaults and written back.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let (rows, _existed): (BTreeMap<String, ConfigEntry>, bool) = persist::load_or_default(path)?;

        let map: HashMap<String, String> = rows
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        let cfg = Self::from_map(&map);

        let missing = cfg
            .to_entries()
            .iter()
            .any(|(key, _, _)| !rows.contains_key(*key));
        if missing {
            cfg.seed(path, rows)?;
        }
        Ok(cfg)
    }

    /// Write every key not already present in `rows`.
    fn seed(&self, path: &Path, mut rows: BTreeMap<String, ConfigEntry>) -> Result<(), StoreError> {
        for (key, value, desc) in self.to_entries() {
            rows.entry(key.to_owned()).or_insert_with(|| ConfigEntry {
                value,
                description: desc.to_owned(),
            });
        }
        persist::write_snapshot(path, &rows)?;
        tracing::info!(path = %path.display(), "config defaults seeded");
        Ok(())
    }

    fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            thought_idle_minutes: get_or(m, "thought_idle_minutes", d.thought_idle_minutes),
            dream_idle_minutes: get_or(m, "dream_idle_minutes", d.dream_idle_minutes),
            idle_poll_secs: get_or(m, "idle_poll_secs", d.idle_poll_secs),
            scheduler_stop_timeout_ms: get_or(m, "scheduler_stop_timeout_ms", d.scheduler_stop_timeout_ms),
            session_reset_hours: get_or(m, "session_reset_hours", d.session_reset_hours),
            dream_share_hours: get_or(m, "dream_share_hours", d.dream_share_hours),
            memory_search_limit: get_or(m, "memory_search_limit", d.memory_search_limit),
            dream_memory_limit: get_or(m, "dream_memory_limit", d.dream_memory_limit),
            notification_buffer: get_or(m, "notification_buffer", d.notification_buffer),
            reply_max_tokens: get_or(m, "reply_max_tokens", d.reply_max_tokens),
            reply_temperature: get_or(m, "reply_temperature", d.reply_temperature),
        }
    }

    fn to_entries(&self) -> Vec<(&'static str, String, &'static str)> {
        vec![
            ("thought_idle_minutes", self.thought_idle_minutes.to_string(), "Idle minutes before a pending thought surfaces"),
            ("dream_idle_minutes", self.dream_idle_minutes.to_string(), "Idle minutes before a dream may form"),
            ("idle_poll_secs", self.idle_poll_secs.to_string(), "Idle scheduler poll interval seconds"),
            ("scheduler_stop_timeout_ms", self.scheduler_stop_timeout_ms.to_string(), "Max wait for the idle scheduler to stop"),
            ("session_reset_hours", self.session_reset_hours.to_string(), "Hours away before session state resets"),
            ("dream_share_hours", self.dream_share_hours.to_string(), "Hours away before a dream is shared on return"),
            ("memory_search_limit", self.memory_search_limit.to_string(), "Memories retrieved per reply"),
            ("dream_memory_limit", self.dream_memory_limit.to_string(), "Recent memories fed into a dream"),
            ("notification_buffer", self.notification_buffer.to_string(), "Idle notification channel capacity"),
            ("reply_max_tokens", self.reply_max_tokens.to_string(), "Max tokens per reply"),
            ("reply_temperature", self.reply_temperature.to_string(), "Reply sampling temperature"),
        ]
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
