//! # Message Bus
//!
//! The facade the rest of the system talks to. It owns the data store, the
//! permission gate, the transaction buffers, the subscription index and the
//! transport handles, and wires them together:
//!
//! ```text
//! mutation ──→ PermissionManager ──┬─ transaction open ──→ TransactionManager.stage
//!                                  └─ otherwise ─────────→ DataStore
//!                                                             │ ChangeEvent
//!                                                             ↓
//!                                   SubscriptionRegistry.resolve_targets
//!                                                             ↓
//!                                           TransportLayer (one fanout pass)
//! ```
//!
//! ## Window states
//!
//! ```text
//! Unregistered ──register──→ Registered ──start──→ TransactionOpen
//!      ↑                        │   ↑                   │
//!      └──────unregister────────┘   └─commit/rollback───┘
//! ```
//!
//! Unregistering rolls back an open transaction, drops every subscription and
//! releases the transport handle. It is idempotent.
//!
//! All methods take `&mut self` and run to completion: the bus is owned by
//! one event loop (see [`crate::host`]) so no locking is involved.

use crate::config::SyncConfig;
use crate::domain::{
    ChangeEvent, ChangeKind, DataStore, FieldPermission, PermissionCheck, PermissionManager,
    StagedOp, SubscriptionRegistry, TransactionManager,
};
use crate::ports::{GroupResolver, SystemTimeSource, TimeSource};
use crate::transport::{TransportKind, TransportLayer, TransportStats, WindowEndpoint};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use sync_types::{
    Entry, Envelope, Frame, SyncError, Timestamp, TransportError, Value, VersionedValue, WindowId,
};
use tracing::{debug, info, warn};

/// Record kept for every registered window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRegistration {
    pub window_id: WindowId,
    pub transport: TransportKind,
    pub registered_at: Timestamp,
}

/// Introspection view of one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub window_id: WindowId,
    pub transport: TransportKind,
    pub subscriptions: Vec<String>,
    pub transaction_open: bool,
    pub registered_at: Timestamp,
}

/// What a mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationOutcome {
    /// Written to the store and fanned out.
    Applied {
        /// Version of the key after the write; `None` for `clear`.
        version: Option<u64>,
        /// Windows the change was delivered to.
        delivered: usize,
    },
    /// Nothing to do (deleting an absent key, clearing an empty store).
    Unchanged,
    /// Buffered in the caller's open transaction.
    Staged,
}

pub struct MessageBus {
    config: SyncConfig,
    store: DataStore,
    permissions: PermissionManager,
    transactions: TransactionManager,
    subscriptions: SubscriptionRegistry,
    transport: TransportLayer,
    windows: HashMap<WindowId, WindowRegistration>,
    groups: Option<Box<dyn GroupResolver>>,
    clock: Arc<dyn TimeSource>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("config", &self.config)
            .field("entries", &self.store.len())
            .field("windows", &self.windows.len())
            .field("open_transactions", &self.transactions.open_count())
            .finish_non_exhaustive()
    }
}

impl MessageBus {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemTimeSource))
    }

    pub fn with_clock(config: SyncConfig, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            store: DataStore::new(),
            permissions: PermissionManager::new(),
            transactions: TransactionManager::new(config.max_staged_ops),
            subscriptions: SubscriptionRegistry::new(),
            transport: TransportLayer::new(config.transport_mode, &config.fallback_channel),
            windows: HashMap::new(),
            groups: None,
            clock,
            config,
        }
    }

    /// Install the group-resolution collaborator used by `send_to_group`.
    #[must_use]
    pub fn with_group_resolver(mut self, resolver: impl GroupResolver + 'static) -> Self {
        self.groups = Some(Box::new(resolver));
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // =========================================================================
    // WINDOW LIFECYCLE
    // =========================================================================

    pub fn register_window(
        &mut self,
        window: WindowId,
        endpoint: WindowEndpoint,
    ) -> Result<TransportKind, SyncError> {
        if self.windows.contains_key(&window) {
            return Err(TransportError::AlreadyRegistered(window).into());
        }
        let transport = self.transport.attach(&window, endpoint)?;
        info!(window_id = %window, transport = %transport, "Window registered");
        self.windows.insert(
            window.clone(),
            WindowRegistration {
                window_id: window,
                transport,
                registered_at: self.clock.now(),
            },
        );
        Ok(transport)
    }

    /// Tear down everything the window owns. Returns `false` if it was not
    /// registered.
    pub fn unregister_window(&mut self, window: &WindowId) -> bool {
        if self.windows.remove(window).is_none() {
            debug!(window_id = %window, "Unregister of unknown window ignored");
            return false;
        }
        if let Some(tx) = self.transactions.abort(window) {
            info!(window_id = %window, staged = tx.len(), "Open transaction rolled back");
        }
        let subscriptions = self.subscriptions.remove_window(window);
        self.transport.detach(window);
        info!(window_id = %window, subscriptions, "Window unregistered");
        true
    }

    pub fn is_registered(&self, window: &WindowId) -> bool {
        self.windows.contains_key(window)
    }

    pub fn registration(&self, window: &WindowId) -> Option<&WindowRegistration> {
        self.windows.get(window)
    }

    pub fn registered_windows(&self) -> Vec<WindowId> {
        let mut windows: Vec<WindowId> = self.windows.keys().cloned().collect();
        windows.sort();
        windows
    }

    pub fn window_snapshot(&self, window: &WindowId) -> Option<WindowSnapshot> {
        let reg = self.windows.get(window)?;
        Some(WindowSnapshot {
            window_id: reg.window_id.clone(),
            transport: reg.transport,
            subscriptions: self.subscriptions.subscriptions_of(window),
            transaction_open: self.transactions.is_open(window),
            registered_at: reg.registered_at,
        })
    }

    /// True if any component still holds state for `window`.
    pub fn has_residual_state(&self, window: &WindowId) -> bool {
        self.windows.contains_key(window)
            || self.subscriptions.contains_window(window)
            || self.transport.contains(window)
            || self.transactions.is_open(window)
    }

    pub fn transport_kind(&self, window: &WindowId) -> Option<TransportKind> {
        self.transport.kind_of(window)
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }

    fn require_registered(&self, window: &WindowId) -> Result<(), SyncError> {
        if self.windows.contains_key(window) {
            Ok(())
        } else {
            Err(TransportError::WindowNotRegistered(window.clone()).into())
        }
    }

    /// A window origin must be registered; the host itself (`None`) always may act.
    fn check_origin(&self, origin: Option<&WindowId>) -> Result<(), SyncError> {
        origin.map_or(Ok(()), |w| self.require_registered(w))
    }

    // =========================================================================
    // SUBSCRIPTIONS & PERMISSIONS
    // =========================================================================

    pub fn subscribe(&mut self, window: &WindowId, keys: Vec<String>) -> Result<usize, SyncError> {
        self.require_registered(window)?;
        let added = self.subscriptions.subscribe(window, keys);
        debug!(window_id = %window, added, "Subscribed");
        Ok(added)
    }

    pub fn unsubscribe(&mut self, window: &WindowId, keys: Vec<String>) -> Result<usize, SyncError> {
        self.require_registered(window)?;
        Ok(self.subscriptions.unsubscribe(window, keys))
    }

    pub fn set_permission(&mut self, key: impl Into<String>, permission: FieldPermission) {
        let key = key.into();
        debug!(key = %key, permission = ?permission, "Permission configured");
        self.permissions.set_permission(key, permission);
    }

    pub fn permission(&self, key: &str) -> &FieldPermission {
        self.permissions.permission(key)
    }

    pub fn check_write(&self, key: &str, window: Option<&WindowId>) -> PermissionCheck {
        self.permissions.check_write(key, window)
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Current value of `key` as seen by `requester`. A window with an open
    /// transaction sees its own staged writes; everyone else sees committed
    /// state only.
    pub fn get(&self, key: &str, requester: Option<&WindowId>) -> Option<Value> {
        self.get_versioned(key, requester).map(|v| v.value)
    }

    pub fn get_versioned(&self, key: &str, requester: Option<&WindowId>) -> Option<VersionedValue> {
        if let Some(staged) = requester.and_then(|w| self.transactions.staged_value(w, key)) {
            return staged.map(|value| VersionedValue {
                value: value.clone(),
                version: self.store.version(key),
            });
        }
        self.store.entry(key).map(VersionedValue::from)
    }

    /// Whole-store view for `requester`, with its staged writes overlaid.
    pub fn snapshot(&self, requester: Option<&WindowId>) -> BTreeMap<String, Value> {
        let mut snapshot = self.store.snapshot();
        if let Some(tx) = requester.and_then(|w| self.transactions.get(w)) {
            for (key, op) in tx.ops() {
                match op {
                    StagedOp::Set(value) => {
                        snapshot.insert(key.to_owned(), value.clone());
                    }
                    StagedOp::Delete => {
                        snapshot.remove(key);
                    }
                }
            }
        }
        snapshot
    }

    /// `snapshot` with each value's version, for mirrors reconciling a cache.
    pub fn versioned_snapshot(&self, requester: Option<&WindowId>) -> BTreeMap<String, VersionedValue> {
        self.snapshot(requester)
            .into_iter()
            .map(|(key, value)| {
                let version = self.store.version(&key);
                (key, VersionedValue { value, version })
            })
            .collect()
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.store.entry(key)
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// The origin, if it currently holds an open transaction.
    fn staging_window<'a>(&self, origin: Option<&'a WindowId>) -> Option<&'a WindowId> {
        origin.filter(|w| self.transactions.is_open(w))
    }

    pub fn set(
        &mut self,
        origin: Option<&WindowId>,
        key: &str,
        value: Value,
    ) -> Result<MutationOutcome, SyncError> {
        self.check_origin(origin)?;
        if let Some(window) = self.staging_window(origin) {
            self.transactions
                .stage(window, key, StagedOp::Set(value), &self.permissions)
                .inspect_err(|e| warn!(window_id = %window, key, error = %e, "Stage rejected"))?;
            return Ok(MutationOutcome::Staged);
        }
        self.authorize(key, origin)?;
        let event = self.store.set(key, value, origin, self.clock.now());
        Ok(self.publish(&event))
    }

    pub fn delete(&mut self, origin: Option<&WindowId>, key: &str) -> Result<MutationOutcome, SyncError> {
        self.check_origin(origin)?;
        if let Some(window) = self.staging_window(origin) {
            self.transactions
                .stage(window, key, StagedOp::Delete, &self.permissions)
                .inspect_err(|e| warn!(window_id = %window, key, error = %e, "Stage rejected"))?;
            return Ok(MutationOutcome::Staged);
        }
        self.authorize(key, origin)?;
        match self.store.delete(key, origin, self.clock.now()) {
            Some(event) => Ok(self.publish(&event)),
            None => Ok(MutationOutcome::Unchanged),
        }
    }

    /// Read-modify-write without a round-trip race. Inside a transaction the
    /// updater sees the staged value (or the committed one) and its result is
    /// staged as a set.
    pub fn update<F>(
        &mut self,
        origin: Option<&WindowId>,
        key: &str,
        updater: F,
    ) -> Result<MutationOutcome, SyncError>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        self.check_origin(origin)?;
        self.authorize(key, origin)?;
        if let Some(window) = self.staging_window(origin) {
            let current = match self.transactions.staged_value(window, key) {
                Some(staged) => staged.cloned(),
                None => self.store.get(key).cloned(),
            };
            let next = updater(current.as_ref());
            self.transactions
                .stage(window, key, StagedOp::Set(next), &self.permissions)?;
            return Ok(MutationOutcome::Staged);
        }
        let event = self.store.update(key, updater, origin, self.clock.now());
        Ok(self.publish(&event))
    }

    /// Remove every key. Refused unless the caller may write all of them.
    pub fn clear(&mut self, origin: Option<&WindowId>) -> Result<MutationOutcome, SyncError> {
        self.check_origin(origin)?;
        if let Some(window) = self.staging_window(origin) {
            let mut keys: BTreeSet<String> = self.store.keys().map(str::to_owned).collect();
            if let Some(tx) = self.transactions.get(window) {
                keys.extend(tx.ops().map(|(k, _)| k.to_owned()));
            }
            self.permissions
                .authorize_all(keys.iter().map(String::as_str), Some(window))?;
            for key in &keys {
                self.transactions
                    .stage(window, key, StagedOp::Delete, &self.permissions)?;
            }
            return Ok(MutationOutcome::Staged);
        }
        self.permissions
            .authorize_all(self.store.keys(), origin)
            .inspect_err(|e| warn!(error = %e, "Clear rejected"))?;
        match self.store.clear(origin, self.clock.now()) {
            Some(event) => Ok(self.publish(&event)),
            None => Ok(MutationOutcome::Unchanged),
        }
    }

    fn authorize(&self, key: &str, origin: Option<&WindowId>) -> Result<(), SyncError> {
        self.permissions.authorize(key, origin).inspect_err(|e| {
            warn!(key, origin = ?origin, error = %e, "Write denied");
        })
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    pub fn start_transaction(&mut self, window: &WindowId) -> Result<(), SyncError> {
        self.require_registered(window)?;
        self.transactions.start(window, self.clock.now())?;
        debug!(window_id = %window, "Transaction started");
        Ok(())
    }

    /// Apply the staged operations in staging order and fan them out as one
    /// batch. Returns how many changes were applied.
    pub fn commit_transaction(&mut self, window: &WindowId) -> Result<usize, SyncError> {
        let tx = self.transactions.take_for_commit(window)?;
        let now = self.clock.now();
        let mut events = Vec::with_capacity(tx.len());
        for (key, op) in tx.into_ops() {
            match op {
                StagedOp::Set(value) => events.push(self.store.set(&key, value, Some(window), now)),
                StagedOp::Delete => events.extend(self.store.delete(&key, Some(window), now)),
            }
        }
        let delivered = if events.is_empty() {
            0
        } else {
            self.fanout(&events)
        };
        info!(
            window_id = %window,
            applied = events.len(),
            delivered,
            "Transaction committed"
        );
        Ok(events.len())
    }

    /// Discard the staged operations. Returns how many were dropped.
    pub fn rollback_transaction(&mut self, window: &WindowId) -> Result<usize, SyncError> {
        let dropped = self.transactions.rollback(window)?;
        debug!(window_id = %window, dropped, "Transaction rolled back");
        Ok(dropped)
    }

    pub fn has_open_transaction(&self, window: &WindowId) -> bool {
        self.transactions.is_open(window)
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    fn message_envelope(&self, origin: Option<&WindowId>, channel: &str, payload: Value) -> Envelope {
        ChangeEvent {
            kind: ChangeKind::Message {
                channel: channel.to_owned(),
                payload,
            },
            origin: origin.cloned(),
            timestamp: self.clock.now(),
        }
        .to_envelope()
    }

    fn without_origin(&self, mut targets: BTreeSet<WindowId>, origin: Option<&WindowId>) -> BTreeSet<WindowId> {
        if !self.config.notify_origin {
            if let Some(origin) = origin {
                targets.remove(origin);
            }
        }
        targets
    }

    /// Send a message to every registered window. Returns the success count.
    pub fn broadcast_message(&mut self, origin: Option<&WindowId>, channel: &str, payload: Value) -> usize {
        let targets = self.without_origin(self.windows.keys().cloned().collect(), origin);
        let frame = Arc::new(Frame::single(self.message_envelope(origin, channel, payload)));
        self.deliver_all(&targets, frame)
    }

    /// Send a message to one window. `false` if it is gone.
    pub fn send_to_window(
        &mut self,
        origin: Option<&WindowId>,
        target: &WindowId,
        channel: &str,
        payload: Value,
    ) -> bool {
        let frame = Arc::new(Frame::single(self.message_envelope(origin, channel, payload)));
        self.transport.dispatch(vec![(target.clone(), frame)]) == 1
    }

    /// Send a message to every member of `group`, as resolved by the group
    /// collaborator. Without a resolver nothing is sent.
    pub fn send_to_group(
        &mut self,
        origin: Option<&WindowId>,
        group: &str,
        channel: &str,
        payload: Value,
    ) -> usize {
        let Some(resolver) = &self.groups else {
            warn!(group, "No group resolver installed");
            return 0;
        };
        let members: BTreeSet<WindowId> = resolver.resolve(group).into_iter().collect();
        let targets = self.without_origin(members, origin);
        let frame = Arc::new(Frame::single(self.message_envelope(origin, channel, payload)));
        self.deliver_all(&targets, frame)
    }

    fn deliver_all(&mut self, targets: &BTreeSet<WindowId>, frame: Arc<Frame>) -> usize {
        if targets.is_empty() {
            return 0;
        }
        self.transport.broadcast(targets, frame)
    }

    // =========================================================================
    // FANOUT
    // =========================================================================

    fn publish(&mut self, event: &ChangeEvent) -> MutationOutcome {
        let delivered = self.fanout(std::slice::from_ref(event));
        MutationOutcome::Applied {
            version: match event.kind {
                ChangeKind::Set { version, .. } | ChangeKind::Delete { version, .. } => Some(version),
                ChangeKind::Clear { .. } | ChangeKind::Message { .. } => None,
            },
            delivered,
        }
    }

    /// One fanout pass for a batch of events. Each window receives a single
    /// frame holding, in order, the events for keys it subscribed to.
    /// Windows that need the same envelopes share one frame.
    fn fanout(&mut self, events: &[ChangeEvent]) -> usize {
        let mut per_window: BTreeMap<WindowId, Vec<usize>> = BTreeMap::new();
        for (index, event) in events.iter().enumerate() {
            let targets = self.subscriptions.resolve_targets_many(event.affected_keys());
            for target in self.without_origin(targets, event.origin.as_ref()) {
                per_window.entry(target).or_default().push(index);
            }
        }
        if per_window.is_empty() {
            return 0;
        }

        let envelopes: Vec<Envelope> = events.iter().map(ChangeEvent::to_envelope).collect();
        let mut shared: HashMap<Vec<usize>, Arc<Frame>> = HashMap::new();
        let deliveries: Vec<(WindowId, Arc<Frame>)> = per_window
            .into_iter()
            .map(|(window, indices)| {
                let frame = shared
                    .entry(indices.clone())
                    .or_insert_with(|| {
                        Arc::new(Frame::from(
                            indices.iter().map(|&i| envelopes[i].clone()).collect::<Vec<_>>(),
                        ))
                    })
                    .clone();
                (window, frame)
            })
            .collect();
        self.transport.dispatch(deliveries)
    }
}
