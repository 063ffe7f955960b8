//! In-process TTL'd key-value store.
//!
//! Backs heartbeats (`node:*`), benchmark challenges (`challenge:*`), and
//! rate-limit counters (`ratelimit:*`). Every operation takes the lock once,
//! so each is individually atomic; expiry is lazy (checked on access) and
//! liveness is defined purely by TTL.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
pub struct EphemeralStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl EphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Overwrite `key` and reset its TTL.
    pub fn set(&self, key: &str, value: impl Into<String>, ttl: Duration) {
        let mut entries = self.entries();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Set `key` only if absent (or expired). Returns whether the write won.
    pub fn set_if_absent(&self, key: &str, value: impl Into<String>, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        if entries.get(key).is_some_and(|e| e.live(now)) {
            return false;
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.into(),
                expires_at: now + ttl,
            },
        );
        true
    }

    /// Atomically increment a counter, creating it at 1 with `ttl` if absent
    /// or expired. The TTL is set only on create, giving fixed-window
    /// semantics. Returns the post-increment count.
    pub fn incr(&self, key: &str, ttl: Duration) -> u64 {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get_mut(key) {
            Some(entry) if entry.live(now) => {
                let count = entry.value.parse::<u64>().unwrap_or(0) + 1;
                entry.value = count.to_string();
                count
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: now + ttl,
                    },
                );
                1
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let entries = self.entries();
        entries
            .get(key)
            .filter(|e| e.live(now))
            .map(|e| e.value.clone())
    }

    /// Remove `key`. Returns whether a live entry was present.
    pub fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        entries.remove(key).is_some_and(|e| e.live(now))
    }

    /// Enumerate live keys starting with `prefix`. Expired entries found
    /// along the way are purged.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let mut entries = self.entries();
        entries.retain(|_, e| e.live(now));
        entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Fetch several keys in one lock acquisition.
    pub fn mget(&self, keys: &[String]) -> Vec<Option<String>> {
        let now = Instant::now();
        let entries = self.entries();
        keys.iter()
            .map(|k| {
                entries
                    .get(k)
                    .filter(|e| e.live(now))
                    .map(|e| e.value.clone())
            })
            .collect()
    }
}
