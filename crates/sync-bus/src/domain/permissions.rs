//! # Permission Manager
//!
//! Per-key write policy. Every mutating path asks this gate before it touches
//! the data store. Checks are pure, so they can run while staging a
//! transaction without side effects.
//!
//! Precedence: `Readonly` always denies, `AllowList` denies non-members,
//! `Open` always allows. A key with no configured policy is `Open`, whether or
//! not it currently holds a value.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use sync_types::{DenyReason, SyncError, WindowId};

/// Write policy for one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldPermission {
    Readonly,
    AllowList(HashSet<WindowId>),
    #[default]
    Open,
}

impl FieldPermission {
    /// Allow-list built from any iterator of window ids.
    pub fn allow<I, W>(windows: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<WindowId>,
    {
        Self::AllowList(windows.into_iter().map(Into::into).collect())
    }
}

/// Outcome of a write check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCheck {
    Allow,
    Deny(DenyReason),
}

impl PermissionCheck {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

static OPEN: FieldPermission = FieldPermission::Open;

#[derive(Debug, Default)]
pub struct PermissionManager {
    policies: HashMap<String, FieldPermission>,
}

impl PermissionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the policy for `key`. Setting `Open` removes the entry.
    pub fn set_permission(&mut self, key: impl Into<String>, permission: FieldPermission) {
        let key = key.into();
        match permission {
            FieldPermission::Open => {
                self.policies.remove(&key);
            }
            other => {
                self.policies.insert(key, other);
            }
        }
    }

    pub fn permission(&self, key: &str) -> &FieldPermission {
        self.policies.get(key).unwrap_or(&OPEN)
    }

    /// Pure check. A `None` caller is the coordinating process itself, which
    /// is never a member of an allow-list.
    pub fn check_write(&self, key: &str, window: Option<&WindowId>) -> PermissionCheck {
        match self.permission(key) {
            FieldPermission::Readonly => PermissionCheck::Deny(DenyReason::Readonly),
            FieldPermission::AllowList(members) => match window {
                Some(w) if members.contains(w) => PermissionCheck::Allow,
                _ => PermissionCheck::Deny(DenyReason::NotInAllowList),
            },
            FieldPermission::Open => PermissionCheck::Allow,
        }
    }

    /// `check_write` as a `Result`, for `?` at mutation entry points.
    pub fn authorize(&self, key: &str, window: Option<&WindowId>) -> Result<(), SyncError> {
        match self.check_write(key, window) {
            PermissionCheck::Allow => Ok(()),
            PermissionCheck::Deny(reason) => Err(SyncError::PermissionDenied {
                key: key.to_owned(),
                window_id: window.cloned(),
                reason,
            }),
        }
    }

    /// Authorize every key; fails on the first denied one.
    pub fn authorize_all<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
        window: Option<&WindowId>,
    ) -> Result<(), SyncError> {
        keys.into_iter()
            .try_for_each(|key| self.authorize(key, window))
    }
}
