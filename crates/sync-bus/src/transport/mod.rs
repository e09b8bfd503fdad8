//! # Transport Layer
//!
//! Delivers frames to windows. Each window gets one of two interchangeable
//! strategies, chosen once at registration by a capability probe and never
//! re-probed:
//!
//! | Strategy | Carrier | Encoding |
//! |----------|---------|----------|
//! | `ZeroCopy` | dedicated per-window port | shared `Arc<Frame>` |
//! | `Fallback` | the window's IPC inbox, on one well-known channel name | JSON tagged with the window id |
//!
//! Delivery is best-effort: a failed send is logged and counted, never
//! retried, and only affects that one recipient.

pub mod endpoint;
pub mod fallback;
pub mod zero_copy;

pub use endpoint::{window_channel, IpcPacket, WindowEndpoint, WindowInbox};
pub use fallback::FallbackTransport;
pub use zero_copy::ZeroCopyTransport;

use crate::config::TransportMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use sync_types::{Frame, SyncError, TransportError, WindowId};
use tracing::{debug, warn};

/// Which strategy serves a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    ZeroCopy,
    Fallback,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCopy => f.write_str("zero-copy"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// Resolve the strategy for a window from the configured mode.
pub fn probe(
    mode: TransportMode,
    window: &WindowId,
    endpoint: &WindowEndpoint,
) -> Result<TransportKind, TransportError> {
    match mode {
        TransportMode::Auto if endpoint.supports_port() => Ok(TransportKind::ZeroCopy),
        TransportMode::Auto | TransportMode::Fallback => Ok(TransportKind::Fallback),
        TransportMode::ZeroCopy if endpoint.supports_port() => Ok(TransportKind::ZeroCopy),
        TransportMode::ZeroCopy => Err(TransportError::Unsupported {
            window_id: window.clone(),
            mode: TransportKind::ZeroCopy.to_string(),
        }),
    }
}

/// Resolved per-window strategy.
#[derive(Debug)]
pub enum WindowTransport {
    ZeroCopy(ZeroCopyTransport),
    Fallback(FallbackTransport),
}

impl WindowTransport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::ZeroCopy(_) => TransportKind::ZeroCopy,
            Self::Fallback(_) => TransportKind::Fallback,
        }
    }

    pub fn send(&self, window: &WindowId, frame: &Arc<Frame>) -> Result<(), SyncError> {
        match self {
            Self::ZeroCopy(t) => t.send(window, frame).map_err(Into::into),
            Self::Fallback(t) => t.send(window, frame),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::ZeroCopy(t) => t.is_closed(),
            Self::Fallback(t) => t.is_closed(),
        }
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStats {
    /// Frames handed to a window's carrier.
    pub frames_sent: u64,
    /// Sends that failed (missing handle, closed channel, encoding error).
    pub send_failures: u64,
    /// Broadcast/dispatch calls. A committed transaction counts once.
    pub fanout_passes: u64,
}

#[derive(Debug)]
pub struct TransportLayer {
    mode: TransportMode,
    fallback_channel: Arc<str>,
    handles: HashMap<WindowId, WindowTransport>,
    stats: TransportStats,
}

impl TransportLayer {
    pub fn new(mode: TransportMode, fallback_channel: &str) -> Self {
        Self {
            mode,
            fallback_channel: Arc::from(fallback_channel),
            handles: HashMap::new(),
            stats: TransportStats::default(),
        }
    }

    /// Probe the endpoint and take ownership of the chosen carrier.
    ///
    /// Replaces any existing handle for the window.
    pub fn attach(
        &mut self,
        window: &WindowId,
        endpoint: WindowEndpoint,
    ) -> Result<TransportKind, TransportError> {
        let kind = probe(self.mode, window, &endpoint)?;
        let transport = match (kind, endpoint.port) {
            (TransportKind::ZeroCopy, Some(port)) => {
                WindowTransport::ZeroCopy(ZeroCopyTransport::new(port))
            }
            _ => WindowTransport::Fallback(FallbackTransport::new(
                endpoint.ipc,
                Arc::clone(&self.fallback_channel),
            )),
        };
        debug!(window_id = %window, transport = %kind, "Transport attached");
        self.handles.insert(window.clone(), transport);
        Ok(kind)
    }

    /// Release the window's carrier. Idempotent.
    pub fn detach(&mut self, window: &WindowId) -> bool {
        self.handles.remove(window).is_some()
    }

    pub fn contains(&self, window: &WindowId) -> bool {
        self.handles.contains_key(window)
    }

    pub fn kind_of(&self, window: &WindowId) -> Option<TransportKind> {
        self.handles.get(window).map(WindowTransport::kind)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// Deliver one frame to one window. `false` if the handle is gone or the
    /// send failed; the failure is logged, not retried.
    pub fn send(&mut self, window: &WindowId, frame: &Arc<Frame>) -> bool {
        let Some(transport) = self.handles.get(window) else {
            warn!(window_id = %window, "Send to unregistered window dropped");
            self.stats.send_failures += 1;
            return false;
        };
        match transport.send(window, frame) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                true
            }
            Err(e) => {
                warn!(window_id = %window, error = %e, "Send failed");
                self.stats.send_failures += 1;
                false
            }
        }
    }

    /// Same frame to every target. Returns the success count.
    pub fn broadcast<'a>(
        &mut self,
        targets: impl IntoIterator<Item = &'a WindowId>,
        frame: Arc<Frame>,
    ) -> usize {
        let deliveries = targets
            .into_iter()
            .map(|w| (w.clone(), Arc::clone(&frame)))
            .collect();
        self.dispatch(deliveries)
    }

    /// One fanout pass with a (possibly different) frame per target.
    /// Per-recipient order follows call order, so delivery stays FIFO.
    pub fn dispatch(&mut self, deliveries: Vec<(WindowId, Arc<Frame>)>) -> usize {
        self.stats.fanout_passes += 1;
        let total = deliveries.len();
        let delivered = deliveries
            .iter()
            .filter(|(window, frame)| self.send(window, frame))
            .count();
        debug!(targets = total, delivered, "Fanout pass complete");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sync_types::{Envelope, TaggedFrame};

    fn win(id: &str) -> WindowId {
        WindowId::new(id)
    }

    fn frame() -> Arc<Frame> {
        Arc::new(Frame::single(Envelope::set("theme", json!("dark"), None, 1, None, 0)))
    }

    #[test]
    fn test_probe_modes() {
        let (with_port, _a) = window_channel(true);
        let (without_port, _b) = window_channel(false);
        let w = win("w");

        assert_eq!(probe(TransportMode::Auto, &w, &with_port), Ok(TransportKind::ZeroCopy));
        assert_eq!(probe(TransportMode::Auto, &w, &without_port), Ok(TransportKind::Fallback));
        assert_eq!(probe(TransportMode::Fallback, &w, &with_port), Ok(TransportKind::Fallback));
        assert!(matches!(
            probe(TransportMode::ZeroCopy, &w, &without_port),
            Err(TransportError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_zero_copy_shares_frame() {
        let mut layer = TransportLayer::new(TransportMode::Auto, "sync");
        let (endpoint, mut inbox) = window_channel(true);
        assert_eq!(layer.attach(&win("a"), endpoint), Ok(TransportKind::ZeroCopy));

        let sent = frame();
        assert!(layer.send(&win("a"), &sent));
        let received = inbox.port.as_mut().unwrap().try_recv().unwrap();
        assert!(Arc::ptr_eq(&sent, &received));
        assert!(inbox.ipc.try_recv().is_err());
    }

    #[test]
    fn test_fallback_tags_window() {
        let mut layer = TransportLayer::new(TransportMode::Auto, "sync");
        let (endpoint, mut inbox) = window_channel(false);
        assert_eq!(layer.attach(&win("b"), endpoint), Ok(TransportKind::Fallback));

        assert!(layer.send(&win("b"), &frame()));
        let packet = inbox.ipc.try_recv().unwrap();
        assert_eq!(packet.channel, "sync");
        let tagged = TaggedFrame::from_json(&packet.body).unwrap();
        assert_eq!(tagged.window_id, win("b"));
        assert_eq!(tagged.messages.len(), 1);
    }

    #[test]
    fn test_broadcast_counts_successes() {
        let mut layer = TransportLayer::new(TransportMode::Auto, "sync");
        let (a, _inbox_a) = window_channel(true);
        let (b, inbox_b) = window_channel(false);
        layer.attach(&win("a"), a).unwrap();
        layer.attach(&win("b"), b).unwrap();
        drop(inbox_b);

        let targets = [win("a"), win("b"), win("ghost")];
        assert_eq!(layer.broadcast(&targets, frame()), 1);

        let stats = layer.stats();
        assert_eq!(stats.fanout_passes, 1);
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.send_failures, 2);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let mut layer = TransportLayer::new(TransportMode::Auto, "sync");
        let (endpoint, _inbox) = window_channel(true);
        layer.attach(&win("a"), endpoint).unwrap();
        assert!(layer.detach(&win("a")));
        assert!(!layer.detach(&win("a")));
        assert!(layer.is_empty());
        assert!(!layer.send(&win("a"), &frame()));
    }
}
