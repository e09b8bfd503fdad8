//! # Host Event Loop
//!
//! The coordinating process runs exactly one [`MessageBus`], owned by a
//! [`SyncHost`] that drains a single request queue. Every request runs to
//! completion before the next one is taken, which is what makes `update` and
//! transaction commits atomic without any lock.
//!
//! ```text
//! ┌──────────────┐   HostRequest    ┌──────────────────────────────┐
//! │ HostHandle   │ ───────────────→ │ SyncHost::run                │
//! │ (cloneable)  │                  │   recv → MessageBus → reply  │
//! │              │ ←─────────────── │                              │
//! └──────────────┘  oneshot reply   └──────────────────────────────┘
//! ```
//!
//! Collaborators (window-lifecycle adapter, mirrors, command routing) get a
//! cloned [`HostHandle`]; none of them ever touches the bus directly. The
//! loop stops on [`HostRequest::Shutdown`] or when every handle is dropped,
//! and hands the bus back to the caller.

use crate::bus::{MessageBus, MutationOutcome, WindowSnapshot};
use crate::domain::FieldPermission;
use crate::transport::{TransportKind, TransportStats, WindowEndpoint};
use std::collections::BTreeMap;
use sync_types::{SyncError, TransportError, Value, VersionedValue, WindowId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Read-modify-write function shipped to the host.
pub type Updater = Box<dyn FnOnce(Option<&Value>) -> Value + Send>;

type Reply<T> = oneshot::Sender<T>;

/// One unit of work for the host loop.
///
/// Replies are optional only where fire-and-forget is meaningful.
pub enum HostRequest {
    RegisterWindow {
        window_id: WindowId,
        endpoint: WindowEndpoint,
        reply: Reply<Result<TransportKind, SyncError>>,
    },
    UnregisterWindow {
        window_id: WindowId,
        reply: Option<Reply<bool>>,
    },
    Subscribe {
        window_id: WindowId,
        keys: Vec<String>,
        reply: Option<Reply<Result<usize, SyncError>>>,
    },
    Unsubscribe {
        window_id: WindowId,
        keys: Vec<String>,
        reply: Option<Reply<Result<usize, SyncError>>>,
    },
    SetPermission {
        key: String,
        permission: FieldPermission,
        reply: Reply<()>,
    },
    Get {
        key: String,
        requester: Option<WindowId>,
        reply: Reply<Option<VersionedValue>>,
    },
    Snapshot {
        requester: Option<WindowId>,
        reply: Reply<BTreeMap<String, VersionedValue>>,
    },
    Set {
        origin: Option<WindowId>,
        key: String,
        value: Value,
        reply: Reply<Result<MutationOutcome, SyncError>>,
    },
    Delete {
        origin: Option<WindowId>,
        key: String,
        reply: Reply<Result<MutationOutcome, SyncError>>,
    },
    Update {
        origin: Option<WindowId>,
        key: String,
        updater: Updater,
        reply: Reply<Result<MutationOutcome, SyncError>>,
    },
    Clear {
        origin: Option<WindowId>,
        reply: Reply<Result<MutationOutcome, SyncError>>,
    },
    StartTransaction {
        window_id: WindowId,
        reply: Reply<Result<(), SyncError>>,
    },
    CommitTransaction {
        window_id: WindowId,
        reply: Reply<Result<usize, SyncError>>,
    },
    RollbackTransaction {
        window_id: WindowId,
        reply: Reply<Result<usize, SyncError>>,
    },
    Broadcast {
        origin: Option<WindowId>,
        channel: String,
        payload: Value,
        reply: Reply<usize>,
    },
    SendToWindow {
        origin: Option<WindowId>,
        target: WindowId,
        channel: String,
        payload: Value,
        reply: Reply<bool>,
    },
    SendToGroup {
        origin: Option<WindowId>,
        group: String,
        channel: String,
        payload: Value,
        reply: Reply<usize>,
    },
    RegisteredWindows {
        reply: Reply<Vec<WindowId>>,
    },
    WindowSnapshot {
        window_id: WindowId,
        reply: Reply<Option<WindowSnapshot>>,
    },
    Stats {
        reply: Reply<TransportStats>,
    },
    Shutdown,
}

impl HostRequest {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterWindow { .. } => "register_window",
            Self::UnregisterWindow { .. } => "unregister_window",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::SetPermission { .. } => "set_permission",
            Self::Get { .. } => "get",
            Self::Snapshot { .. } => "snapshot",
            Self::Set { .. } => "set",
            Self::Delete { .. } => "delete",
            Self::Update { .. } => "update",
            Self::Clear { .. } => "clear",
            Self::StartTransaction { .. } => "start_transaction",
            Self::CommitTransaction { .. } => "commit_transaction",
            Self::RollbackTransaction { .. } => "rollback_transaction",
            Self::Broadcast { .. } => "broadcast",
            Self::SendToWindow { .. } => "send_to_window",
            Self::SendToGroup { .. } => "send_to_group",
            Self::RegisteredWindows { .. } => "registered_windows",
            Self::WindowSnapshot { .. } => "window_snapshot",
            Self::Stats { .. } => "stats",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Debug for HostRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HostRequest").field(&self.name()).finish()
    }
}

/// Owner of the bus and its request queue.
pub struct SyncHost {
    bus: MessageBus,
    requests: mpsc::UnboundedReceiver<HostRequest>,
}

impl SyncHost {
    pub fn new(bus: MessageBus) -> (Self, HostHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { bus, requests: rx }, HostHandle { tx })
    }

    /// Build the host and run it on the current tokio runtime.
    pub fn spawn(bus: MessageBus) -> (HostHandle, JoinHandle<MessageBus>) {
        let (host, handle) = Self::new(bus);
        (handle, tokio::spawn(host.run()))
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut MessageBus {
        &mut self.bus
    }

    /// Drain requests until shutdown. Returns the bus for inspection.
    pub async fn run(mut self) -> MessageBus {
        info!("Sync host started");
        while let Some(request) = self.requests.recv().await {
            if !self.handle(request) {
                break;
            }
        }
        info!(windows = self.bus.registered_windows().len(), "Sync host stopped");
        self.bus
    }

    /// Run one request to completion. Returns `false` on shutdown.
    ///
    /// A dropped reply receiver is not an error: the caller gave up waiting
    /// but the mutation still happened.
    pub fn handle(&mut self, request: HostRequest) -> bool {
        debug!(request = request.name(), "Handling host request");
        let bus = &mut self.bus;
        match request {
            HostRequest::RegisterWindow {
                window_id,
                endpoint,
                reply,
            } => {
                let _ = reply.send(bus.register_window(window_id, endpoint));
            }
            HostRequest::UnregisterWindow { window_id, reply } => {
                let removed = bus.unregister_window(&window_id);
                if let Some(reply) = reply {
                    let _ = reply.send(removed);
                }
            }
            HostRequest::Subscribe {
                window_id,
                keys,
                reply,
            } => {
                let result = bus.subscribe(&window_id, keys);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            HostRequest::Unsubscribe {
                window_id,
                keys,
                reply,
            } => {
                let result = bus.unsubscribe(&window_id, keys);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            HostRequest::SetPermission {
                key,
                permission,
                reply,
            } => {
                bus.set_permission(key, permission);
                let _ = reply.send(());
            }
            HostRequest::Get {
                key,
                requester,
                reply,
            } => {
                let _ = reply.send(bus.get_versioned(&key, requester.as_ref()));
            }
            HostRequest::Snapshot { requester, reply } => {
                let _ = reply.send(bus.versioned_snapshot(requester.as_ref()));
            }
            HostRequest::Set {
                origin,
                key,
                value,
                reply,
            } => {
                let _ = reply.send(bus.set(origin.as_ref(), &key, value));
            }
            HostRequest::Delete { origin, key, reply } => {
                let _ = reply.send(bus.delete(origin.as_ref(), &key));
            }
            HostRequest::Update {
                origin,
                key,
                updater,
                reply,
            } => {
                let _ = reply.send(bus.update(origin.as_ref(), &key, updater));
            }
            HostRequest::Clear { origin, reply } => {
                let _ = reply.send(bus.clear(origin.as_ref()));
            }
            HostRequest::StartTransaction { window_id, reply } => {
                let _ = reply.send(bus.start_transaction(&window_id));
            }
            HostRequest::CommitTransaction { window_id, reply } => {
                let _ = reply.send(bus.commit_transaction(&window_id));
            }
            HostRequest::RollbackTransaction { window_id, reply } => {
                let _ = reply.send(bus.rollback_transaction(&window_id));
            }
            HostRequest::Broadcast {
                origin,
                channel,
                payload,
                reply,
            } => {
                let _ = reply.send(bus.broadcast_message(origin.as_ref(), &channel, payload));
            }
            HostRequest::SendToWindow {
                origin,
                target,
                channel,
                payload,
                reply,
            } => {
                let _ = reply.send(bus.send_to_window(origin.as_ref(), &target, &channel, payload));
            }
            HostRequest::SendToGroup {
                origin,
                group,
                channel,
                payload,
                reply,
            } => {
                let _ = reply.send(bus.send_to_group(origin.as_ref(), &group, &channel, payload));
            }
            HostRequest::RegisteredWindows { reply } => {
                let _ = reply.send(bus.registered_windows());
            }
            HostRequest::WindowSnapshot { window_id, reply } => {
                let _ = reply.send(bus.window_snapshot(&window_id));
            }
            HostRequest::Stats { reply } => {
                let _ = reply.send(bus.transport_stats());
            }
            HostRequest::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        }
        true
    }
}

fn host_unavailable() -> SyncError {
    TransportError::HostUnavailable.into()
}

/// Cloneable injection handle to the host loop.
#[derive(Debug, Clone)]
pub struct HostHandle {
    tx: mpsc::UnboundedSender<HostRequest>,
}

impl HostHandle {
    /// True once the host loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn send(&self, request: HostRequest) -> Result<(), SyncError> {
        self.tx.send(request).map_err(|_| host_unavailable())
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> HostRequest) -> Result<T, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| host_unavailable())
    }

    pub async fn register_window(
        &self,
        window_id: WindowId,
        endpoint: WindowEndpoint,
    ) -> Result<TransportKind, SyncError> {
        self.call(|reply| HostRequest::RegisterWindow {
            window_id,
            endpoint,
            reply,
        })
        .await?
    }

    pub async fn unregister_window(&self, window_id: WindowId) -> Result<bool, SyncError> {
        self.call(|reply| HostRequest::UnregisterWindow {
            window_id,
            reply: Some(reply),
        })
        .await
    }

    pub async fn subscribe(&self, window_id: WindowId, keys: Vec<String>) -> Result<usize, SyncError> {
        self.call(|reply| HostRequest::Subscribe {
            window_id,
            keys,
            reply: Some(reply),
        })
        .await?
    }

    pub async fn unsubscribe(&self, window_id: WindowId, keys: Vec<String>) -> Result<usize, SyncError> {
        self.call(|reply| HostRequest::Unsubscribe {
            window_id,
            keys,
            reply: Some(reply),
        })
        .await?
    }

    /// Queue a subscription without waiting for the host.
    pub fn subscribe_detached(&self, window_id: WindowId, keys: Vec<String>) -> Result<(), SyncError> {
        self.send(HostRequest::Subscribe {
            window_id,
            keys,
            reply: None,
        })
    }

    /// Queue an unsubscription without waiting for the host.
    pub fn unsubscribe_detached(&self, window_id: WindowId, keys: Vec<String>) -> Result<(), SyncError> {
        self.send(HostRequest::Unsubscribe {
            window_id,
            keys,
            reply: None,
        })
    }

    pub async fn set_permission(
        &self,
        key: impl Into<String>,
        permission: FieldPermission,
    ) -> Result<(), SyncError> {
        let key = key.into();
        self.call(|reply| HostRequest::SetPermission {
            key,
            permission,
            reply,
        })
        .await
    }

    pub async fn get(&self, key: &str, requester: Option<WindowId>) -> Result<Option<Value>, SyncError> {
        Ok(self.get_versioned(key, requester).await?.map(|v| v.value))
    }

    pub async fn get_versioned(
        &self,
        key: &str,
        requester: Option<WindowId>,
    ) -> Result<Option<VersionedValue>, SyncError> {
        self.call(|reply| HostRequest::Get {
            key: key.to_owned(),
            requester,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self, requester: Option<WindowId>) -> Result<BTreeMap<String, Value>, SyncError> {
        let versioned = self.versioned_snapshot(requester).await?;
        Ok(versioned.into_iter().map(|(k, v)| (k, v.value)).collect())
    }

    pub async fn versioned_snapshot(
        &self,
        requester: Option<WindowId>,
    ) -> Result<BTreeMap<String, VersionedValue>, SyncError> {
        self.call(|reply| HostRequest::Snapshot { requester, reply }).await
    }

    pub async fn set(
        &self,
        origin: Option<WindowId>,
        key: &str,
        value: Value,
    ) -> Result<MutationOutcome, SyncError> {
        self.call(|reply| HostRequest::Set {
            origin,
            key: key.to_owned(),
            value,
            reply,
        })
        .await?
    }

    pub async fn delete(&self, origin: Option<WindowId>, key: &str) -> Result<MutationOutcome, SyncError> {
        self.call(|reply| HostRequest::Delete {
            origin,
            key: key.to_owned(),
            reply,
        })
        .await?
    }

    pub async fn update<F>(
        &self,
        origin: Option<WindowId>,
        key: &str,
        updater: F,
    ) -> Result<MutationOutcome, SyncError>
    where
        F: FnOnce(Option<&Value>) -> Value + Send + 'static,
    {
        self.call(|reply| HostRequest::Update {
            origin,
            key: key.to_owned(),
            updater: Box::new(updater),
            reply,
        })
        .await?
    }

    pub async fn clear(&self, origin: Option<WindowId>) -> Result<MutationOutcome, SyncError> {
        self.call(|reply| HostRequest::Clear { origin, reply }).await?
    }

    pub async fn start_transaction(&self, window_id: WindowId) -> Result<(), SyncError> {
        self.call(|reply| HostRequest::StartTransaction { window_id, reply })
            .await?
    }

    pub async fn commit_transaction(&self, window_id: WindowId) -> Result<usize, SyncError> {
        self.call(|reply| HostRequest::CommitTransaction { window_id, reply })
            .await?
    }

    pub async fn rollback_transaction(&self, window_id: WindowId) -> Result<usize, SyncError> {
        self.call(|reply| HostRequest::RollbackTransaction { window_id, reply })
            .await?
    }

    pub async fn broadcast_message(
        &self,
        origin: Option<WindowId>,
        channel: &str,
        payload: Value,
    ) -> Result<usize, SyncError> {
        self.call(|reply| HostRequest::Broadcast {
            origin,
            channel: channel.to_owned(),
            payload,
            reply,
        })
        .await
    }

    pub async fn send_to_window(
        &self,
        origin: Option<WindowId>,
        target: WindowId,
        channel: &str,
        payload: Value,
    ) -> Result<bool, SyncError> {
        self.call(|reply| HostRequest::SendToWindow {
            origin,
            target,
            channel: channel.to_owned(),
            payload,
            reply,
        })
        .await
    }

    pub async fn send_to_group(
        &self,
        origin: Option<WindowId>,
        group: &str,
        channel: &str,
        payload: Value,
    ) -> Result<usize, SyncError> {
        self.call(|reply| HostRequest::SendToGroup {
            origin,
            group: group.to_owned(),
            channel: channel.to_owned(),
            payload,
            reply,
        })
        .await
    }

    pub async fn registered_windows(&self) -> Result<Vec<WindowId>, SyncError> {
        self.call(|reply| HostRequest::RegisteredWindows { reply }).await
    }

    pub async fn window_snapshot(&self, window_id: WindowId) -> Result<Option<WindowSnapshot>, SyncError> {
        self.call(|reply| HostRequest::WindowSnapshot { window_id, reply })
            .await
    }

    pub async fn transport_stats(&self) -> Result<TransportStats, SyncError> {
        self.call(|reply| HostRequest::Stats { reply }).await
    }

    /// Ask the loop to stop after the requests already queued.
    pub fn shutdown(&self) -> Result<(), SyncError> {
        self.send(HostRequest::Shutdown)
    }
}
