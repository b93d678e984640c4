//! Entry Metadata Module
//!
//! Defines the JSON sidecar written next to every data file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, IoStep, Result};

fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// == Entry Metadata ==
/// Bookkeeping for one on-disk entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Original caller-supplied key
    pub key: String,
    /// Absolute path of the paired data file
    pub filename: PathBuf,
    /// When the entry was written
    pub set: DateTime<Utc>,
    /// When the entry becomes eligible for reclamation
    pub expire: DateTime<Utc>,
}

impl EntryMetadata {
    /// Creates metadata for an entry written at `now` living for `ttl`.
    ///
    /// Expiry saturates at the end of year 9999 so it always round-trips
    /// through RFC 3339.
    pub fn new(key: &str, filename: &Path, now: DateTime<Utc>, ttl: Duration) -> Self {
        let latest = far_future();
        let expire = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .map_or(latest, |expire| expire.min(latest));

        Self {
            key: key.to_string(),
            filename: filename.to_path_buf(),
            set: now,
            expire,
        }
    }

    /// True once `now` is strictly past the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expire
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CacheError::Internal(format!("failed to serialize metadata: {e}")))
    }

    /// Reads and parses a sidecar file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| CacheError::io(IoStep::Read, path, e))?;
        serde_json::from_slice(&raw).map_err(|source| CacheError::MalformedMetadata {
            path: path.to_path_buf(),
            source,
        })
    }
}
