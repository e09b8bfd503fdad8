//! # Transaction Manager
//!
//! Per-window staging buffers. Between `start` and `commit`/`rollback` a
//! window's mutations are held here instead of reaching the data store.
//!
//! ```text
//! [none] ──start──→ [OPEN] ──commit───→ [COMMITTED]
//!                      │
//!                      └──rollback / window gone──→ [ROLLED_BACK]
//! ```
//!
//! - At most one open transaction per window, no nesting.
//! - Staging the same key twice keeps the key's original position and the
//!   newest operation (last-write-wins within the transaction).
//! - Permission is checked at stage time: a denied operation fails right away
//!   and leaves the rest of the buffer intact.

use super::permissions::PermissionManager;
use indexmap::IndexMap;
use std::collections::HashMap;
use sync_types::{SyncError, Timestamp, TransactionError, Value, WindowId};

/// A buffered mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedOp {
    Set(Value),
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    window_id: WindowId,
    staged: IndexMap<String, StagedOp>,
    state: TransactionState,
    opened_at: Timestamp,
}

impl Transaction {
    fn new(window_id: WindowId, opened_at: Timestamp) -> Self {
        Self {
            window_id,
            staged: IndexMap::new(),
            state: TransactionState::Open,
            opened_at,
        }
    }

    pub fn window_id(&self) -> &WindowId {
        &self.window_id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn opened_at(&self) -> Timestamp {
        self.opened_at
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Staged operations in staging order.
    pub fn ops(&self) -> impl Iterator<Item = (&str, &StagedOp)> {
        self.staged.iter().map(|(k, op)| (k.as_str(), op))
    }

    pub fn into_ops(self) -> impl Iterator<Item = (String, StagedOp)> {
        self.staged.into_iter()
    }
}

#[derive(Debug)]
pub struct TransactionManager {
    open: HashMap<WindowId, Transaction>,
    max_staged_ops: usize,
}

impl TransactionManager {
    pub fn new(max_staged_ops: usize) -> Self {
        Self {
            open: HashMap::new(),
            max_staged_ops,
        }
    }

    pub fn is_open(&self, window: &WindowId) -> bool {
        self.open.contains_key(window)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn get(&self, window: &WindowId) -> Option<&Transaction> {
        self.open.get(window)
    }

    pub fn start(&mut self, window: &WindowId, now: Timestamp) -> Result<(), TransactionError> {
        if self.open.contains_key(window) {
            return Err(TransactionError::AlreadyOpen(window.clone()));
        }
        self.open
            .insert(window.clone(), Transaction::new(window.clone(), now));
        Ok(())
    }

    /// Buffer `op` for `key`, after checking the caller may write it.
    pub fn stage(
        &mut self,
        window: &WindowId,
        key: &str,
        op: StagedOp,
        permissions: &PermissionManager,
    ) -> Result<(), SyncError> {
        let limit = self.max_staged_ops;
        let tx = self
            .open
            .get_mut(window)
            .ok_or_else(|| TransactionError::NotOpen(window.clone()))?;
        permissions.authorize(key, Some(window))?;
        if !tx.staged.contains_key(key) && tx.staged.len() >= limit {
            return Err(TransactionError::TooManyOps { limit }.into());
        }
        tx.staged.insert(key.to_owned(), op);
        Ok(())
    }

    /// What the window's own transaction says about `key`.
    ///
    /// `None`: not staged. `Some(None)`: staged delete. `Some(Some(v))`: staged set.
    pub fn staged_value(&self, window: &WindowId, key: &str) -> Option<Option<&Value>> {
        let op = self.open.get(window)?.staged.get(key)?;
        Some(match op {
            StagedOp::Set(value) => Some(value),
            StagedOp::Delete => None,
        })
    }

    /// Close the transaction for commit and hand its buffer to the caller.
    pub fn take_for_commit(&mut self, window: &WindowId) -> Result<Transaction, TransactionError> {
        let mut tx = self
            .open
            .remove(window)
            .ok_or_else(|| TransactionError::NotOpen(window.clone()))?;
        tx.state = TransactionState::Committed;
        Ok(tx)
    }

    /// Discard the buffer. Returns how many operations were dropped.
    pub fn rollback(&mut self, window: &WindowId) -> Result<usize, TransactionError> {
        self.abort(window)
            .map(|tx| tx.len())
            .ok_or_else(|| TransactionError::NotOpen(window.clone()))
    }

    /// Roll back if open; used when a window goes away.
    pub fn abort(&mut self, window: &WindowId) -> Option<Transaction> {
        let mut tx = self.open.remove(window)?;
        tx.state = TransactionState::RolledBack;
        Some(tx)
    }
}
