//! # Sync Runtime
//!
//! Wires one [`SyncHost`] per process and hands out injection handles.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment and validate it
//! 2. Build the `MessageBus` (with the group resolver, if any)
//! 3. Spawn the host event loop
//! 4. Spawn the window-lifecycle adapter
//! 5. Open windows; each gets a mirror

use anyhow::{Context, Result};
use sync_bus::{
    auto_register, GroupResolver, HostHandle, MessageBus, SyncConfig, SyncHost,
    WindowLifecycleEvent,
};
use sync_mirror::Mirror;
use sync_types::WindowId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct SyncRuntime {
    config: SyncConfig,
    host: HostHandle,
    host_task: JoinHandle<MessageBus>,
    lifecycle: mpsc::UnboundedSender<WindowLifecycleEvent>,
    lifecycle_task: JoinHandle<()>,
}

impl SyncRuntime {
    /// Validate `config` and start the host loop and the lifecycle adapter.
    pub fn start(config: SyncConfig, groups: Option<Box<dyn GroupResolver>>) -> Result<Self> {
        config.validate().context("invalid sync configuration")?;
        info!(
            transport_mode = ?config.transport_mode,
            notify_origin = config.notify_origin,
            fallback_channel = %config.fallback_channel,
            "Starting sync runtime"
        );

        let mut bus = MessageBus::new(config.clone());
        if let Some(groups) = groups {
            bus = bus.with_group_resolver(move |group: &str| groups.resolve(group));
        }
        let (host, host_task) = SyncHost::spawn(bus);
        let (lifecycle, events) = mpsc::unbounded_channel();
        let lifecycle_task = auto_register(events, host.clone());

        Ok(Self {
            config,
            host,
            host_task,
            lifecycle,
            lifecycle_task,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Injection handle for collaborators.
    pub fn handle(&self) -> HostHandle {
        self.host.clone()
    }

    /// Sender the window-lifecycle collaborator reports to.
    pub fn lifecycle(&self) -> mpsc::UnboundedSender<WindowLifecycleEvent> {
        self.lifecycle.clone()
    }

    /// Register a window and build its mirror.
    pub async fn open_window(&self, window_id: WindowId, with_port: bool) -> Result<Mirror> {
        let mirror = Mirror::connect(self.host.clone(), window_id.clone(), with_port)
            .await
            .with_context(|| format!("failed to open window {window_id}"))?;
        Ok(mirror.with_fallback_channel(self.config.fallback_channel.clone()))
    }

    /// Report a destroyed window through the lifecycle adapter.
    pub fn close_window(&self, window_id: WindowId) -> Result<()> {
        self.lifecycle
            .send(WindowLifecycleEvent::Destroyed { window_id })
            .context("lifecycle adapter stopped")
    }

    /// Drain the lifecycle adapter, stop the host and return the final bus.
    pub async fn shutdown(self) -> Result<MessageBus> {
        drop(self.lifecycle);
        self.lifecycle_task
            .await
            .context("lifecycle adapter panicked")?;
        self.host.shutdown()?;
        let bus = self.host_task.await.context("host loop panicked")?;
        info!(windows = bus.registered_windows().len(), "Sync runtime stopped");
        Ok(bus)
    }
}
