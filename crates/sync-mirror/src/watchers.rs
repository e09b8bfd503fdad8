//! # Watcher Dispatch
//!
//! Multimap `topic -> callbacks` used for both key watchers and message
//! listeners. Every callback runs in its own panic boundary: a panicking
//! watcher is logged and the remaining ones still get the event.
//!
//! Handles unregister their callback on drop, in the manner of a bus
//! subscription going out of scope.

use crate::mirror::MirrorState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use sync_bus::HostHandle;
use sync_types::{Value, WindowId};
use tracing::{debug, error};

/// Change to a watched key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEvent {
    pub key: String,
    /// `None` when the key was deleted or cleared.
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
    /// Window that made the change; `None` for the host itself.
    pub window_id: Option<WindowId>,
    pub version: Option<u64>,
}

/// Message received on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub channel: String,
    pub payload: Value,
    pub window_id: Option<WindowId>,
}

pub type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct CallbackTable<E> {
    by_topic: HashMap<String, Vec<(u64, Callback<E>)>>,
    next_id: u64,
}

impl<E> Default for CallbackTable<E> {
    fn default() -> Self {
        Self {
            by_topic: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<E> std::fmt::Debug for CallbackTable<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .by_topic
            .iter()
            .map(|(topic, cbs)| (topic.as_str(), cbs.len()))
            .collect();
        f.debug_struct("CallbackTable").field("topics", &counts).finish()
    }
}

impl<E> CallbackTable<E> {
    /// Register a callback. Returns its id and whether it is the first for `topic`.
    pub fn insert(&mut self, topic: &str, callback: Callback<E>) -> (u64, bool) {
        let id = self.next_id;
        self.next_id += 1;
        let entries = self.by_topic.entry(topic.to_owned()).or_default();
        entries.push((id, callback));
        (id, entries.len() == 1)
    }

    /// Remove a callback. `Some(true)` if it was the last one for `topic`.
    pub fn remove(&mut self, topic: &str, id: u64) -> Option<bool> {
        let entries = self.by_topic.get_mut(topic)?;
        let position = entries.iter().position(|(i, _)| *i == id)?;
        entries.remove(position);
        if entries.is_empty() {
            self.by_topic.remove(topic);
            return Some(true);
        }
        Some(false)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.by_topic.contains_key(topic)
    }

    pub fn count(&self, topic: &str) -> usize {
        self.by_topic.get(topic).map_or(0, Vec::len)
    }

    /// Snapshot of the callbacks for `topic`, in registration order.
    pub fn callbacks(&self, topic: &str) -> Vec<Callback<E>> {
        self.by_topic
            .get(topic)
            .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Invoke every callback with `event`. Returns how many completed normally.
pub fn dispatch<E>(topic: &str, callbacks: &[Callback<E>], event: &E) -> usize {
    callbacks
        .iter()
        .filter(|callback| match catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(()) => true,
            Err(payload) => {
                error!(topic, panic = panic_message(payload.as_ref()), "Watcher panicked");
                false
            }
        })
        .count()
}

/// Keeps a key watcher alive. Dropping it unregisters the callback; the last
/// handle for a key also drops the cached value and the host subscription.
#[must_use = "dropping the handle stops the watcher"]
pub struct WatchHandle {
    pub(crate) key: String,
    pub(crate) id: u64,
    pub(crate) window_id: WindowId,
    pub(crate) state: Weak<Mutex<MirrorState>>,
    pub(crate) host: HostHandle,
}

impl WatchHandle {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let last = {
            let mut state = state.lock();
            let last = state.watchers.remove(&self.key, self.id) == Some(true);
            if last {
                state.cache.invalidate(&self.key);
            }
            last
        };
        if last {
            if let Err(e) = self
                .host
                .unsubscribe_detached(self.window_id.clone(), vec![self.key.clone()])
            {
                debug!(key = %self.key, error = %e, "Unsubscribe after last watcher skipped");
            }
        }
        debug!(key = %self.key, "Watcher dropped");
    }
}

/// Keeps a message listener alive. Dropping it unregisters the callback.
#[must_use = "dropping the handle stops the listener"]
pub struct ListenerHandle {
    pub(crate) channel: String,
    pub(crate) id: u64,
    pub(crate) state: Weak<Mutex<MirrorState>>,
}

impl ListenerHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().listeners.remove(&self.channel, self.id);
        }
    }
}
