//! # Renderer Mirror
//!
//! One per window. Reads hit the local cache when it can be trusted,
//! mutations round-trip to the host and resolve only once the authoritative
//! write is done, and pushed frames keep the cache and the watchers current.
//!
//! ## Cache discipline
//!
//! - Only watched keys are cached; everything else is read from the host.
//! - While this window has a transaction open every read goes to the host,
//!   which overlays the staged writes.
//! - After a mutation is acknowledged, pending frames are applied first; an
//!   entry still older than the acknowledged version is dropped.
//!
//! Frames are applied by [`Mirror::pump`] (non-blocking) or
//! [`Mirror::recv`] (waits for the next one). Every mirror call that talks to
//! the host pumps first.

use crate::cache::MirrorCache;
use crate::watchers::{
    dispatch, Callback, CallbackTable, ListenerHandle, MessageEvent, WatchEvent, WatchHandle,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use sync_bus::{HostHandle, IpcPacket, MutationOutcome, WindowInbox, DEFAULT_FALLBACK_CHANNEL};
use sync_types::{
    Envelope, EnvelopeKind, Frame, MutationResult, SyncError, TaggedFrame, Value, WindowId,
};
use tracing::{debug, warn};

/// State shared between the mirror and its watch handles.
#[derive(Debug, Default)]
pub struct MirrorState {
    pub(crate) cache: MirrorCache,
    pub(crate) watchers: CallbackTable<WatchEvent>,
    pub(crate) listeners: CallbackTable<MessageEvent>,
}

/// Keys this window touched in its open transaction.
#[derive(Debug, Default)]
enum Staged {
    #[default]
    Nothing,
    Keys(HashSet<String>),
    Everything,
}

impl Staged {
    fn touch(&mut self, key: &str) {
        match self {
            Self::Nothing => *self = Self::Keys(HashSet::from([key.to_owned()])),
            Self::Keys(keys) => {
                keys.insert(key.to_owned());
            }
            Self::Everything => {}
        }
    }
}

enum Incoming {
    Port(Arc<Frame>),
    Ipc(IpcPacket),
}

pub struct Mirror {
    window_id: WindowId,
    host: HostHandle,
    inbox: WindowInbox,
    fallback_channel: String,
    state: Arc<Mutex<MirrorState>>,
    transaction: Option<Staged>,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("window_id", &self.window_id)
            .field("in_transaction", &self.transaction.is_some())
            .finish_non_exhaustive()
    }
}

impl Mirror {
    /// Mirror for a window the lifecycle collaborator already registered.
    pub fn new(window_id: WindowId, inbox: WindowInbox, host: HostHandle) -> Self {
        Self {
            window_id,
            host,
            inbox,
            fallback_channel: DEFAULT_FALLBACK_CHANNEL.to_owned(),
            state: Arc::new(Mutex::new(MirrorState::default())),
            transaction: None,
        }
    }

    /// Must match the host's configured fallback channel.
    #[must_use]
    pub fn with_fallback_channel(mut self, channel: impl Into<String>) -> Self {
        self.fallback_channel = channel.into();
        self
    }

    /// Register a fresh window with the host and mirror it.
    pub async fn connect(
        host: HostHandle,
        window_id: WindowId,
        with_port: bool,
    ) -> Result<Self, SyncError> {
        let (endpoint, inbox) = sync_bus::window_channel(with_port);
        host.register_window(window_id.clone(), endpoint).await?;
        Ok(Self::new(window_id, inbox, host))
    }

    pub fn window_id(&self) -> &WindowId {
        &self.window_id
    }

    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn is_watching(&self, key: &str) -> bool {
        self.state.lock().watchers.contains(key)
    }

    pub fn watcher_count(&self, key: &str) -> usize {
        self.state.lock().watchers.count(key)
    }

    /// Cached value and version, if the key is cached.
    pub fn cached(&self, key: &str) -> Option<(Option<Value>, u64)> {
        self.state
            .lock()
            .cache
            .get(key)
            .map(|c| (c.value.clone(), c.version))
    }

    fn origin(&self) -> Option<WindowId> {
        Some(self.window_id.clone())
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Value of `key`. Served from the cache when the key is watched and
    /// cached, otherwise fetched from the host.
    pub async fn get(&mut self, key: &str) -> Result<Option<Value>, SyncError> {
        self.pump();
        let cacheable = self.transaction.is_none() && self.is_watching(key);
        if cacheable {
            if let Some(hit) = self.state.lock().cache.get(key) {
                return Ok(hit.value.clone());
            }
        }
        let fetched = self.host.get_versioned(key, self.origin()).await?;
        if let Some(fetched) = &fetched {
            let mut state = self.state.lock();
            if cacheable && state.watchers.contains(key) {
                state.cache.fill(key, fetched);
            }
        }
        Ok(fetched.map(|v| v.value))
    }

    /// Whole store. Always fetched; refreshes cached watched keys.
    pub async fn get_all(&mut self) -> Result<BTreeMap<String, Value>, SyncError> {
        self.pump();
        let snapshot = self.host.versioned_snapshot(self.origin()).await?;
        if self.transaction.is_none() {
            let mut state = self.state.lock();
            for (key, fetched) in &snapshot {
                if state.watchers.contains(key) {
                    state.cache.fill(key, fetched);
                }
            }
        }
        Ok(snapshot.into_iter().map(|(k, v)| (k, v.value)).collect())
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    pub async fn set(&mut self, key: &str, value: Value) -> MutationResult {
        self.pump();
        let result = self.host.set(self.origin(), key, value).await;
        self.settle(key, &result);
        result.into()
    }

    pub async fn delete(&mut self, key: &str) -> MutationResult {
        self.pump();
        let result = self.host.delete(self.origin(), key).await;
        self.settle(key, &result);
        result.into()
    }

    /// Read-modify-write evaluated by the host.
    pub async fn update<F>(&mut self, key: &str, updater: F) -> MutationResult
    where
        F: FnOnce(Option<&Value>) -> Value + Send + 'static,
    {
        self.pump();
        let result = self.host.update(self.origin(), key, updater).await;
        self.settle(key, &result);
        result.into()
    }

    pub async fn clear(&mut self) -> MutationResult {
        self.pump();
        let result = self.host.clear(self.origin()).await;
        match &result {
            Ok(MutationOutcome::Staged) => {
                if let Some(staged) = self.transaction.as_mut() {
                    *staged = Staged::Everything;
                }
            }
            Ok(MutationOutcome::Applied { .. }) => {
                self.pump();
                // Without self-notification nothing told the cache.
                self.state.lock().cache.clear();
            }
            Ok(MutationOutcome::Unchanged) | Err(_) => {}
        }
        result.into()
    }

    /// Reconcile the cache with an acknowledged mutation of `key`.
    fn settle(&mut self, key: &str, result: &Result<MutationOutcome, SyncError>) {
        match result {
            Ok(MutationOutcome::Staged) => {
                if let Some(staged) = self.transaction.as_mut() {
                    staged.touch(key);
                }
            }
            Ok(MutationOutcome::Applied {
                version: Some(version),
                ..
            }) => {
                self.pump();
                if self.state.lock().cache.invalidate_below(key, *version) {
                    debug!(key, version, "Cached value behind acknowledged write dropped");
                }
            }
            Ok(_) => {
                self.pump();
            }
            Err(e) => debug!(window_id = %self.window_id, key, error = %e, "Mutation rejected"),
        }
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    pub async fn start_transaction(&mut self) -> MutationResult {
        let result = self.host.start_transaction(self.window_id.clone()).await;
        if result.is_ok() {
            self.transaction = Some(Staged::default());
        }
        result.into()
    }

    pub async fn commit_transaction(&mut self) -> MutationResult {
        let result = self.host.commit_transaction(self.window_id.clone()).await;
        let staged = self.transaction.take();
        self.pump();
        if let (Ok(applied), Some(staged)) = (&result, staged) {
            debug!(window_id = %self.window_id, applied, "Transaction committed");
            let mut state = self.state.lock();
            match staged {
                Staged::Nothing => {}
                Staged::Keys(keys) => {
                    for key in &keys {
                        state.cache.invalidate(key);
                    }
                }
                Staged::Everything => {
                    state.cache.clear();
                }
            }
        }
        result.into()
    }

    pub async fn rollback_transaction(&mut self) -> MutationResult {
        let result = self.host.rollback_transaction(self.window_id.clone()).await;
        self.transaction = None;
        result.into()
    }

    // =========================================================================
    // WATCHERS & MESSAGES
    // =========================================================================

    /// Call `callback` for every subsequent change to `key`. Nothing fires
    /// until the next change arrives.
    pub fn watch<F>(&self, key: &str, callback: F) -> Result<WatchHandle, SyncError>
    where
        F: Fn(&WatchEvent) + Send + Sync + 'static,
    {
        let callback: Callback<WatchEvent> = Arc::new(callback);
        let (id, first) = self.state.lock().watchers.insert(key, callback);
        let handle = WatchHandle {
            key: key.to_owned(),
            id,
            window_id: self.window_id.clone(),
            state: Arc::downgrade(&self.state),
            host: self.host.clone(),
        };
        if first {
            self.host
                .subscribe_detached(self.window_id.clone(), vec![key.to_owned()])?;
            debug!(window_id = %self.window_id, key, "Subscribed on first watcher");
        }
        Ok(handle)
    }

    /// Call `callback` for every message received on `channel`.
    pub fn on_message<F>(&self, channel: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&MessageEvent) + Send + Sync + 'static,
    {
        let callback: Callback<MessageEvent> = Arc::new(callback);
        let (id, _) = self.state.lock().listeners.insert(channel, callback);
        ListenerHandle {
            channel: channel.to_owned(),
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    pub async fn broadcast_message(&mut self, channel: &str, payload: Value) -> Result<usize, SyncError> {
        self.host
            .broadcast_message(self.origin(), channel, payload)
            .await
    }

    pub async fn send_to_window(
        &mut self,
        target: WindowId,
        channel: &str,
        payload: Value,
    ) -> Result<bool, SyncError> {
        self.host
            .send_to_window(self.origin(), target, channel, payload)
            .await
    }

    pub async fn send_to_group(
        &mut self,
        group: &str,
        channel: &str,
        payload: Value,
    ) -> Result<usize, SyncError> {
        self.host
            .send_to_group(self.origin(), group, channel, payload)
            .await
    }

    // =========================================================================
    // INBOUND FRAMES
    // =========================================================================

    /// Apply every frame already waiting. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let next = match self.inbox.port.as_mut().map(|port| port.try_recv()) {
                Some(Ok(frame)) => Incoming::Port(frame),
                _ => match self.inbox.ipc.try_recv() {
                    Ok(packet) => Incoming::Ipc(packet),
                    Err(_) => break,
                },
            };
            if self.apply_incoming(next) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next frame and apply it. Returns whether it was applied;
    /// `None` once both carriers are closed.
    pub async fn recv(&mut self) -> Option<bool> {
        let next = match self.inbox.port.as_mut() {
            Some(port) => tokio::select! {
                Some(frame) = port.recv() => Some(Incoming::Port(frame)),
                Some(packet) = self.inbox.ipc.recv() => Some(Incoming::Ipc(packet)),
                else => None,
            },
            None => self.inbox.ipc.recv().await.map(Incoming::Ipc),
        }?;
        Some(self.apply_incoming(next))
    }

    fn apply_incoming(&mut self, incoming: Incoming) -> bool {
        match incoming {
            Incoming::Port(frame) => {
                self.apply_frame(&frame);
                true
            }
            Incoming::Ipc(packet) => match self.decode_packet(&packet) {
                Some(frame) => {
                    self.apply_frame(&frame);
                    true
                }
                None => false,
            },
        }
    }

    fn decode_packet(&self, packet: &IpcPacket) -> Option<Frame> {
        if packet.channel != self.fallback_channel {
            warn!(window_id = %self.window_id, channel = %packet.channel, "Packet on unexpected channel ignored");
            return None;
        }
        let tagged = match TaggedFrame::from_json(&packet.body) {
            Ok(tagged) => tagged,
            Err(e) => {
                warn!(window_id = %self.window_id, error = %e, "Undecodable frame dropped");
                return None;
            }
        };
        if tagged.window_id != self.window_id {
            warn!(
                window_id = %self.window_id,
                addressed_to = %tagged.window_id,
                "Frame for another window ignored"
            );
            return None;
        }
        Some(tagged.messages)
    }

    /// Update the cache and collect callbacks under the lock, then run the
    /// callbacks with the lock released so they may call back into the mirror
    /// state (e.g. drop their own handle).
    fn apply_frame(&self, frame: &Frame) {
        let mut watch_calls: Vec<(String, Vec<Callback<WatchEvent>>, WatchEvent)> = Vec::new();
        let mut message_calls: Vec<(String, Vec<Callback<MessageEvent>>, MessageEvent)> = Vec::new();
        {
            let mut state = self.state.lock();
            for envelope in &frame.envelopes {
                match envelope.kind {
                    EnvelopeKind::Set | EnvelopeKind::Delete => {
                        if let Some(call) = Self::apply_change(&mut state, envelope) {
                            watch_calls.push(call);
                        }
                    }
                    EnvelopeKind::Clear => {
                        for removed in &envelope.removed {
                            let key = removed.key.as_str();
                            if !state.watchers.contains(key) {
                                state.cache.invalidate(key);
                                continue;
                            }
                            if !state.cache.apply(key, None, Some(removed.version)) {
                                debug!(key, version = removed.version, "Stale clear ignored");
                                continue;
                            }
                            let event = WatchEvent {
                                key: key.to_owned(),
                                new_value: None,
                                old_value: Some(removed.old_value.clone()),
                                window_id: envelope.window_id.clone(),
                                version: Some(removed.version),
                            };
                            watch_calls.push((key.to_owned(), state.watchers.callbacks(key), event));
                        }
                    }
                    EnvelopeKind::Message => {
                        let Some(channel) = envelope.channel.clone() else {
                            warn!(window_id = %self.window_id, "Message without channel dropped");
                            continue;
                        };
                        let callbacks = state.listeners.callbacks(&channel);
                        let event = MessageEvent {
                            channel: channel.clone(),
                            payload: envelope.payload.clone().unwrap_or(Value::Null),
                            window_id: envelope.window_id.clone(),
                        };
                        message_calls.push((channel, callbacks, event));
                    }
                }
            }
        }
        for (key, callbacks, event) in &watch_calls {
            dispatch(key, callbacks, event);
        }
        for (channel, callbacks, event) in &message_calls {
            dispatch(channel, callbacks, event);
        }
    }

    fn apply_change(
        state: &mut MirrorState,
        envelope: &Envelope,
    ) -> Option<(String, Vec<Callback<WatchEvent>>, WatchEvent)> {
        let key = envelope.key.as_deref()?;
        if !state.watchers.contains(key) {
            // Late frame for a key we stopped watching.
            return None;
        }
        let new_value = match envelope.kind {
            EnvelopeKind::Set => Some(envelope.value.clone().unwrap_or(Value::Null)),
            _ => None,
        };
        if !state.cache.apply(key, new_value.clone(), envelope.version) {
            debug!(key, version = ?envelope.version, "Stale change ignored");
            return None;
        }
        let event = WatchEvent {
            key: key.to_owned(),
            new_value,
            old_value: envelope.old_value.clone(),
            window_id: envelope.window_id.clone(),
            version: envelope.version,
        };
        Some((key.to_owned(), state.watchers.callbacks(key), event))
    }
}
