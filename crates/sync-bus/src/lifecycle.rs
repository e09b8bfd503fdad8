//! # Window Lifecycle Adapter
//!
//! Bridges the window-lifecycle collaborator to the host: every creation
//! notification becomes a registration, every destruction an unregistration.
//! A failed registration is logged and skipped; the adapter keeps running
//! until the notification stream ends or the host goes away.

use crate::host::HostHandle;
use crate::transport::WindowEndpoint;
use sync_types::{SyncError, TransportError, WindowId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Notification emitted by the window-lifecycle collaborator.
#[derive(Debug)]
pub enum WindowLifecycleEvent {
    Created {
        window_id: WindowId,
        endpoint: WindowEndpoint,
    },
    Destroyed {
        window_id: WindowId,
    },
}

impl WindowLifecycleEvent {
    pub fn window_id(&self) -> &WindowId {
        match self {
            Self::Created { window_id, .. } | Self::Destroyed { window_id } => window_id,
        }
    }
}

/// Forward lifecycle notifications to the host until either side closes.
pub fn auto_register(
    mut events: mpsc::UnboundedReceiver<WindowLifecycleEvent>,
    host: HostHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Window lifecycle adapter started");
        while let Some(event) = events.recv().await {
            if let Err(SyncError::Transport(TransportError::HostUnavailable)) =
                forward(&host, event).await
            {
                warn!("Host stopped, lifecycle adapter exiting");
                return;
            }
        }
        info!("Window lifecycle stream closed");
    })
}

async fn forward(host: &HostHandle, event: WindowLifecycleEvent) -> Result<(), SyncError> {
    match event {
        WindowLifecycleEvent::Created {
            window_id,
            endpoint,
        } => match host.register_window(window_id.clone(), endpoint).await {
            Ok(transport) => {
                info!(window_id = %window_id, transport = %transport, "Window auto-registered");
                Ok(())
            }
            Err(e) => {
                warn!(window_id = %window_id, error = %e, "Auto-registration failed");
                Err(e)
            }
        },
        WindowLifecycleEvent::Destroyed { window_id } => {
            let removed = host.unregister_window(window_id.clone()).await?;
            info!(window_id = %window_id, removed, "Window auto-unregistered");
            Ok(())
        }
    }
}
