//! # Subscription Registry
//!
//! Inverted index `key -> windows` deciding who gets pushed a change.
//! Subscriptions only gate push notifications; a window that never
//! subscribed still reads correct data with a direct `get`.

use std::collections::{BTreeSet, HashMap, HashSet};
use sync_types::WindowId;

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_key: HashMap<String, BTreeSet<WindowId>>,
    by_window: HashMap<WindowId, HashSet<String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many keys were newly subscribed.
    pub fn subscribe<I, K>(&mut self, window: &WindowId, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut added = 0;
        for key in keys {
            let key = key.into();
            let own = self.by_window.entry(window.clone()).or_default();
            if own.insert(key.clone()) {
                self.by_key.entry(key).or_default().insert(window.clone());
                added += 1;
            }
        }
        added
    }

    /// Returns how many keys were actually removed.
    pub fn unsubscribe<I, K>(&mut self, window: &WindowId, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let Some(own) = self.by_window.get_mut(window) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            let key = key.as_ref();
            if own.remove(key) {
                Self::drop_index(&mut self.by_key, key, window);
                removed += 1;
            }
        }
        if own.is_empty() {
            self.by_window.remove(window);
        }
        removed
    }

    /// Drop every subscription of `window`. Returns how many were removed.
    pub fn remove_window(&mut self, window: &WindowId) -> usize {
        let Some(keys) = self.by_window.remove(window) else {
            return 0;
        };
        for key in &keys {
            Self::drop_index(&mut self.by_key, key, window);
        }
        keys.len()
    }

    fn drop_index(by_key: &mut HashMap<String, BTreeSet<WindowId>>, key: &str, window: &WindowId) {
        if let Some(windows) = by_key.get_mut(key) {
            windows.remove(window);
            if windows.is_empty() {
                by_key.remove(key);
            }
        }
    }

    /// Fanout set for a change to `key`.
    pub fn resolve_targets(&self, key: &str) -> BTreeSet<WindowId> {
        self.by_key.get(key).cloned().unwrap_or_default()
    }

    /// Union of the fanout sets of several keys.
    pub fn resolve_targets_many<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> BTreeSet<WindowId> {
        keys.into_iter()
            .filter_map(|key| self.by_key.get(key))
            .flatten()
            .cloned()
            .collect()
    }

    pub fn is_subscribed(&self, window: &WindowId, key: &str) -> bool {
        self.by_window
            .get(window)
            .is_some_and(|keys| keys.contains(key))
    }

    /// Keys `window` is subscribed to, sorted.
    pub fn subscriptions_of(&self, window: &WindowId) -> Vec<String> {
        let mut keys: Vec<String> = self
            .by_window
            .get(window)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// True if `window` appears anywhere in the index.
    pub fn contains_window(&self, window: &WindowId) -> bool {
        self.by_window.contains_key(window) || self.by_key.values().any(|w| w.contains(window))
    }
}
