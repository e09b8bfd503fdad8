//! # Change Events
//!
//! Raw events emitted by the data store (and by message sends). They are
//! turned into wire envelopes only when they are fanned out.

use sync_types::{ClearedKey, Envelope, Timestamp, Value, WindowId};

/// What changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Set {
        key: String,
        new_value: Value,
        old_value: Option<Value>,
        version: u64,
    },
    Delete {
        key: String,
        old_value: Option<Value>,
        version: u64,
    },
    /// The whole store was emptied; `removed` lists every key it held.
    Clear { removed: Vec<ClearedKey> },
    Message { channel: String, payload: Value },
}

/// A change together with who caused it and when.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// `None` when the coordinating process itself made the change.
    pub origin: Option<WindowId>,
    pub timestamp: Timestamp,
}

impl ChangeEvent {
    /// The single key this event touches, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match &self.kind {
            ChangeKind::Set { key, .. } | ChangeKind::Delete { key, .. } => Some(key),
            ChangeKind::Clear { .. } | ChangeKind::Message { .. } => None,
        }
    }

    /// Every key the event affects. Used to compute subscription fanout.
    #[must_use]
    pub fn affected_keys(&self) -> Vec<&str> {
        match &self.kind {
            ChangeKind::Set { key, .. } | ChangeKind::Delete { key, .. } => vec![key.as_str()],
            ChangeKind::Clear { removed } => removed.iter().map(|r| r.key.as_str()).collect(),
            ChangeKind::Message { .. } => Vec::new(),
        }
    }

    /// Wire form of this event.
    #[must_use]
    pub fn to_envelope(&self) -> Envelope {
        let origin = self.origin.clone();
        match &self.kind {
            ChangeKind::Set {
                key,
                new_value,
                old_value,
                version,
            } => Envelope::set(
                key.clone(),
                new_value.clone(),
                old_value.clone(),
                *version,
                origin,
                self.timestamp,
            ),
            ChangeKind::Delete {
                key,
                old_value,
                version,
            } => Envelope::delete(key.clone(), old_value.clone(), *version, origin, self.timestamp),
            ChangeKind::Clear { removed } => Envelope::clear(removed.clone(), origin, self.timestamp),
            ChangeKind::Message { channel, payload } => {
                Envelope::message(channel.clone(), payload.clone(), origin, self.timestamp)
            }
        }
    }
}
