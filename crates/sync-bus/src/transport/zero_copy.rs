//! Dedicated per-window port. Frames travel as `Arc<Frame>`: every recipient
//! of a fanout pass shares the same frame and nothing is re-serialized.

use super::endpoint::PortSender;
use std::sync::Arc;
use sync_types::{Frame, TransportError, WindowId};

#[derive(Debug)]
pub struct ZeroCopyTransport {
    port: PortSender,
}

impl ZeroCopyTransport {
    pub fn new(port: PortSender) -> Self {
        Self { port }
    }

    pub fn send(&self, window: &WindowId, frame: &Arc<Frame>) -> Result<(), TransportError> {
        self.port
            .send(Arc::clone(frame))
            .map_err(|_| TransportError::ChannelClosed(window.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.port.is_closed()
    }
}
