//! # Window Endpoints
//!
//! What the window-lifecycle collaborator hands the engine when a window is
//! created, and the matching receiving half the window keeps.
//!
//! Every window has a generic IPC inbox (string packets tagged with a
//! channel name). A window may additionally offer a dedicated port that
//! carries frames as shared, already-built values.

use std::sync::Arc;
use sync_types::Frame;
use tokio::sync::mpsc;

pub type PortSender = mpsc::UnboundedSender<Arc<Frame>>;
pub type PortReceiver = mpsc::UnboundedReceiver<Arc<Frame>>;
pub type IpcSender = mpsc::UnboundedSender<IpcPacket>;
pub type IpcReceiver = mpsc::UnboundedReceiver<IpcPacket>;

/// One message on a window's generic IPC inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcPacket {
    pub channel: String,
    pub body: String,
}

/// Sending half, owned by the engine once the window is registered.
#[derive(Debug, Clone)]
pub struct WindowEndpoint {
    pub ipc: IpcSender,
    pub port: Option<PortSender>,
}

impl WindowEndpoint {
    /// Capability probe: can this window take a dedicated port?
    pub fn supports_port(&self) -> bool {
        self.port.as_ref().is_some_and(|port| !port.is_closed())
    }
}

/// Receiving half, owned by the window.
#[derive(Debug)]
pub struct WindowInbox {
    pub ipc: IpcReceiver,
    pub port: Option<PortReceiver>,
}

/// Build a connected endpoint/inbox pair.
pub fn window_channel(with_port: bool) -> (WindowEndpoint, WindowInbox) {
    let (ipc_tx, ipc_rx) = mpsc::unbounded_channel();
    let (port_tx, port_rx) = if with_port {
        let (tx, rx) = mpsc::unbounded_channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };
    (
        WindowEndpoint {
            ipc: ipc_tx,
            port: port_tx,
        },
        WindowInbox {
            ipc: ipc_rx,
            port: port_rx,
        },
    )
}
