//! Time-to-live cache keyed by string
//!
//! Values are stored as JSON so one cache can hold country records, city records
//! and weather payloads side by side. Reads are typed through serde.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A stored value and the instant after which it must not be returned
#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// Process-local cache with per-entry expiry and no size bound
#[derive(Debug, Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous entry
    ///
    /// Values that cannot be serialized are skipped with a warning; cache writes
    /// never fail the caller.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, "Skipping cache write, value not serializable: {}", e);
                return;
            }
        };

        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.entries
            .lock()
            .insert(key.to_string(), CacheEntry { value, expires_at });
    }

    /// Returns the value for `key` if it has not expired
    ///
    /// An expired entry is evicted. An entry that does not deserialize as `T` is
    /// reported as absent but left in place.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Utc::now();
        let value = {
            let mut entries = self.entries.lock();
            let entry = entries.get(key)?;
            if !entry.is_fresh(now) {
                entries.remove(key);
                tracing::debug!(key, "Cache entry expired");
                return None;
            }
            entry.value.clone()
        };

        serde_json::from_value(value).ok()
    }

    pub fn has(&self, key: &str) -> bool {
        self.get::<serde_json::Value>(key).is_some()
    }

    /// Removes an entry regardless of expiry, returning whether one existed
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every expired entry and returns how many were removed
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        before - entries.len()
    }
}
