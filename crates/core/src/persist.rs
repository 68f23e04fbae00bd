//! Snapshot persistence: whole-document JSON files rewritten on every save.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io { path: path.to_path_buf(), source }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// Serialize `value` and atomically replace `path` (write temp, then rename).
pub fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let body = serde_json::to_string_pretty(value)?;
    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, body).map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}

/// Load a snapshot, falling back to `T::default()` when the file is absent.
///
/// A document that does not parse is moved to `<path>.corrupt` and replaced
/// by defaults. Returns the value and whether a usable file existed.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<(T, bool), StoreError> {
    let body = match fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((T::default(), false)),
        Err(e) => return Err(io_err(path)(e)),
    };

    match serde_json::from_str::<T>(&body) {
        Ok(value) => Ok((value, true)),
        Err(e) => {
            let quarantine = sibling(path, ".corrupt");
            tracing::warn!(
                path = %path.display(),
                quarantine = %quarantine.display(),
                error = %e,
                "snapshot unreadable, starting from defaults"
            );
            fs::rename(path, &quarantine).map_err(io_err(path))?;
            Ok((T::default(), false))
        }
    }
}

/// Tolerant field decoders for documents written by older versions.
pub mod lenient {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer};

    /// Accepts RFC 3339, naive local ISO timestamps, or null. Anything else
    /// decodes as `None` instead of failing the whole document.
    pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let Some(raw) = value.as_str() else {
            return Ok(None);
        };
        Ok(parse_timestamp(raw))
    }

    /// For required timestamps: anything [`timestamp`] rejects reads as now.
    pub fn timestamp_or_now<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(timestamp(deserializer)?.unwrap_or_else(Utc::now))
    }

    pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|ts| ts.with_timezone(&Utc))
    }
}
