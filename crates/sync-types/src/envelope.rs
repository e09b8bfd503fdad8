//! # Wire Envelope
//!
//! The message shape delivered to windows. It is the same whichever transport
//! strategy carries it:
//!
//! ```text
//! { type: "set" | "delete" | "clear" | "message",
//!   key?, value?, oldValue?, channel?, payload?, windowId?, timestamp, version?,
//!   removed?: [{ key, oldValue, version }] }
//! ```
//!
//! Every transport send carries a [`Frame`]: an ordered batch of envelopes.
//! A direct mutation produces a one-envelope frame; a committed transaction
//! produces a single frame per recipient holding all of its changes.

use crate::entities::{Timestamp, Value, WindowId};
use serde::{Deserialize, Serialize};

/// Discriminant of an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Set,
    Delete,
    Clear,
    Message,
}

/// One key removed by a `clear`, with its last value and the version after
/// removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedKey {
    pub key: String,
    pub old_value: Value,
    pub version: u64,
}

/// A single change or message as seen by a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// JSON `null` and absence are indistinguishable once decoded; a `set`
    /// envelope without a value means the key now holds `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Originating window, absent when the host itself made the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    pub timestamp: Timestamp,
    /// Store version of `key` after the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Keys emptied by a `clear`, ordered by key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<ClearedKey>,
}

impl Envelope {
    fn bare(kind: EnvelopeKind, origin: Option<WindowId>, timestamp: Timestamp) -> Self {
        Self {
            kind,
            key: None,
            value: None,
            old_value: None,
            channel: None,
            payload: None,
            window_id: origin,
            timestamp,
            version: None,
            removed: Vec::new(),
        }
    }

    pub fn set(
        key: impl Into<String>,
        value: Value,
        old_value: Option<Value>,
        version: u64,
        origin: Option<WindowId>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value),
            old_value,
            version: Some(version),
            ..Self::bare(EnvelopeKind::Set, origin, timestamp)
        }
    }

    pub fn delete(
        key: impl Into<String>,
        old_value: Option<Value>,
        version: u64,
        origin: Option<WindowId>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            key: Some(key.into()),
            old_value,
            version: Some(version),
            ..Self::bare(EnvelopeKind::Delete, origin, timestamp)
        }
    }

    pub fn clear(removed: Vec<ClearedKey>, origin: Option<WindowId>, timestamp: Timestamp) -> Self {
        Self {
            removed,
            ..Self::bare(EnvelopeKind::Clear, origin, timestamp)
        }
    }

    pub fn message(
        channel: impl Into<String>,
        payload: Value,
        origin: Option<WindowId>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            channel: Some(channel.into()),
            payload: Some(payload),
            ..Self::bare(EnvelopeKind::Message, origin, timestamp)
        }
    }
}

/// Ordered batch of envelopes delivered in one transport send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame {
    pub envelopes: Vec<Envelope>,
}

impl Frame {
    #[must_use]
    pub fn single(envelope: Envelope) -> Self {
        Self {
            envelopes: vec![envelope],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

impl From<Vec<Envelope>> for Frame {
    fn from(envelopes: Vec<Envelope>) -> Self {
        Self { envelopes }
    }
}

/// A frame tagged with its recipient, used when many windows share one
/// well-known channel name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedFrame {
    pub window_id: WindowId,
    pub messages: Frame,
}

impl TaggedFrame {
    /// Encode for a string-based IPC channel.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a payload received on a string-based IPC channel.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_envelope_wire_shape() {
        let env = Envelope::set("theme", json!("light"), Some(json!("dark")), 2, Some("a".into()), 42);
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "set",
                "key": "theme",
                "value": "light",
                "oldValue": "dark",
                "windowId": "a",
                "timestamp": 42,
                "version": 2
            })
        );
    }

    #[test]
    fn test_clear_envelope_omits_optional_fields() {
        let wire = serde_json::to_value(Envelope::clear(Vec::new(), None, 7)).unwrap();
        assert_eq!(wire, json!({ "type": "clear", "timestamp": 7 }));
    }

    #[test]
    fn test_clear_envelope_lists_removed_keys() {
        let removed = vec![ClearedKey {
            key: "theme".into(),
            old_value: json!("dark"),
            version: 3,
        }];
        let wire = serde_json::to_value(Envelope::clear(removed.clone(), Some("a".into()), 7)).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "clear",
                "windowId": "a",
                "timestamp": 7,
                "removed": [{ "key": "theme", "oldValue": "dark", "version": 3 }]
            })
        );
        let back: Envelope = serde_json::from_value(wire).unwrap();
        assert_eq!(back.removed, removed);
    }

    #[test]
    fn test_message_envelope_decodes_from_minimal_json() {
        let env: Envelope = serde_json::from_value(json!({
            "type": "message",
            "channel": "toast",
            "payload": { "text": "hi" },
            "timestamp": 1
        }))
        .unwrap();
        assert_eq!(env.kind, EnvelopeKind::Message);
        assert_eq!(env.channel.as_deref(), Some("toast"));
        assert!(env.window_id.is_none());
    }

    #[test]
    fn test_tagged_frame_json() {
        let tagged = TaggedFrame {
            window_id: "w1".into(),
            messages: Frame::from(vec![
                Envelope::delete("a", Some(json!(1)), 4, None, 5),
                Envelope::clear(Vec::new(), None, 6),
            ]),
        };
        let raw = tagged.to_json().unwrap();
        assert!(raw.contains("\"windowId\":\"w1\""));
        let back = TaggedFrame::from_json(&raw).unwrap();
        assert_eq!(back.messages.len(), 2);
        assert_eq!(back.messages.envelopes[0].kind, EnvelopeKind::Delete);
    }
}
