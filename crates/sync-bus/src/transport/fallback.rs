//! Multiplexed delivery over one well-known channel name. The frame is
//! encoded to JSON and tagged with the recipient's window id so a window can
//! tell its own traffic apart.

use super::endpoint::{IpcPacket, IpcSender};
use std::sync::Arc;
use sync_types::{Frame, SyncError, TaggedFrame, TransportError, WindowId};

#[derive(Debug)]
pub struct FallbackTransport {
    ipc: IpcSender,
    channel: Arc<str>,
}

impl FallbackTransport {
    pub fn new(ipc: IpcSender, channel: Arc<str>) -> Self {
        Self { ipc, channel }
    }

    pub fn send(&self, window: &WindowId, frame: &Frame) -> Result<(), SyncError> {
        let body = TaggedFrame {
            window_id: window.clone(),
            messages: frame.clone(),
        }
        .to_json()?;
        self.ipc
            .send(IpcPacket {
                channel: self.channel.to_string(),
                body,
            })
            .map_err(|_| TransportError::ChannelClosed(window.clone()).into())
    }

    pub fn is_closed(&self) -> bool {
        self.ipc.is_closed()
    }
}
