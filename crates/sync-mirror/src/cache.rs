//! # Mirror Cache
//!
//! Local copy of the keys this window watches. Unwatched keys are never
//! cached: nothing would tell the mirror they changed.
//!
//! Each entry remembers the store version it reflects, so a pushed change or
//! a round-trip reply that is older than what the cache already holds is
//! dropped instead of overwriting newer data.

use std::collections::HashMap;
use sync_types::{Value, VersionedValue};

/// A cached key. `value: None` records a known deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub value: Option<Value>,
    pub version: u64,
}

#[derive(Debug, Default)]
pub struct MirrorCache {
    entries: HashMap<String, CachedValue>,
}

impl MirrorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CachedValue> {
        self.entries.get(key)
    }

    pub fn version(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|c| c.version)
    }

    /// Store a value read from the host unless something newer is cached.
    pub fn fill(&mut self, key: &str, fetched: &VersionedValue) -> bool {
        if self.version(key).is_some_and(|v| v >= fetched.version) {
            return false;
        }
        self.entries.insert(
            key.to_owned(),
            CachedValue {
                value: Some(fetched.value.clone()),
                version: fetched.version,
            },
        );
        true
    }

    /// Apply a pushed change. Returns `false` for a stale one.
    ///
    /// A change without a version is always applied.
    pub fn apply(&mut self, key: &str, value: Option<Value>, version: Option<u64>) -> bool {
        let cached = self.version(key);
        if let (Some(cached), Some(incoming)) = (cached, version) {
            if cached >= incoming {
                return false;
            }
        }
        let version = version.or(cached).unwrap_or(0);
        self.entries
            .insert(key.to_owned(), CachedValue { value, version });
        true
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop the entry if it is older than `version`.
    pub fn invalidate_below(&mut self, key: &str, version: u64) -> bool {
        if self.version(key).is_some_and(|v| v < version) {
            self.entries.remove(key);
            return true;
        }
        false
    }

    /// Empty the cache, returning the keys that held a value.
    pub fn clear(&mut self) -> Vec<(String, Value)> {
        let mut removed: Vec<(String, Value)> = self
            .entries
            .drain()
            .filter_map(|(key, cached)| cached.value.map(|v| (key, v)))
            .collect();
        removed.sort_by(|a, b| a.0.cmp(&b.0));
        removed
    }
}
