//! # Data Store
//!
//! Authoritative key/value map. Knows nothing about permissions, windows or
//! transports: it applies mutations and returns the change event each one
//! produced.
//!
//! ## Invariants
//!
//! - Every successful mutation bumps the key's version and yields exactly one
//!   `ChangeEvent`.
//! - Versions are monotonic per key and survive `delete`/`clear`; a key that
//!   is re-created continues from its previous version.

use super::events::{ChangeEvent, ChangeKind};
use std::collections::{BTreeMap, HashMap};
use sync_types::{ClearedKey, Entry, Timestamp, Value, WindowId};

#[derive(Debug, Default)]
pub struct DataStore {
    entries: HashMap<String, Entry>,
    /// Last version handed out per key, kept after removal.
    versions: HashMap<String, u64>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Current version of `key`, 0 if it was never written.
    pub fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    /// Whole-store view, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn bump(&mut self, key: &str) -> u64 {
        let version = self.versions.entry(key.to_owned()).or_insert(0);
        *version += 1;
        *version
    }

    pub fn set(
        &mut self,
        key: &str,
        value: Value,
        origin: Option<&WindowId>,
        now: Timestamp,
    ) -> ChangeEvent {
        let version = self.bump(key);
        let previous = self.entries.insert(
            key.to_owned(),
            Entry {
                key: key.to_owned(),
                value: value.clone(),
                version,
                last_writer_window_id: origin.cloned(),
                updated_at: now,
            },
        );
        ChangeEvent {
            kind: ChangeKind::Set {
                key: key.to_owned(),
                new_value: value,
                old_value: previous.map(|e| e.value),
                version,
            },
            origin: origin.cloned(),
            timestamp: now,
        }
    }

    /// Remove `key`. Deleting an absent key is a no-op and yields no event.
    pub fn delete(
        &mut self,
        key: &str,
        origin: Option<&WindowId>,
        now: Timestamp,
    ) -> Option<ChangeEvent> {
        let previous = self.entries.remove(key)?;
        let version = self.bump(key);
        Some(ChangeEvent {
            kind: ChangeKind::Delete {
                key: key.to_owned(),
                old_value: Some(previous.value),
                version,
            },
            origin: origin.cloned(),
            timestamp: now,
        })
    }

    /// Read-modify-write. The updater sees the current value and its result
    /// is stored before any other mutation can run.
    pub fn update<F>(
        &mut self,
        key: &str,
        updater: F,
        origin: Option<&WindowId>,
        now: Timestamp,
    ) -> ChangeEvent
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let next = updater(self.get(key));
        self.set(key, next, origin, now)
    }

    /// Empty the store. Yields no event when it was already empty.
    pub fn clear(&mut self, origin: Option<&WindowId>, now: Timestamp) -> Option<ChangeEvent> {
        if self.entries.is_empty() {
            return None;
        }
        let mut drained: Vec<(String, Entry)> = self.entries.drain().collect();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        let removed = drained
            .into_iter()
            .map(|(key, entry)| {
                let version = self.bump(&key);
                ClearedKey {
                    key,
                    old_value: entry.value,
                    version,
                }
            })
            .collect();
        Some(ChangeEvent {
            kind: ChangeKind::Clear { removed },
            origin: origin.cloned(),
            timestamp: now,
        })
    }
}
