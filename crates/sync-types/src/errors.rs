//! # Error Types
//!
//! The error taxonomy shared by the engine and the window mirrors.

use crate::entities::WindowId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error code carried in mutation replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PermissionDenied,
    SerializationError,
    TransportError,
    TransactionError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::TransactionError => "TRANSACTION_ERROR",
        };
        f.write_str(code)
    }
}

/// Why a write was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    /// The key is readonly for every caller.
    Readonly,
    /// The caller is not on the key's allow-list.
    NotInAllowList,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Readonly => f.write_str("key is readonly"),
            Self::NotInAllowList => f.write_str("window is not in the key's allow-list"),
        }
    }
}

/// Delivery or registration failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No registration exists for the window.
    #[error("Window not registered: {0}")]
    WindowNotRegistered(WindowId),

    /// The window was registered twice without being unregistered.
    #[error("Window already registered: {0}")]
    AlreadyRegistered(WindowId),

    /// The window's channel is gone.
    #[error("Channel closed for window {0}")]
    ChannelClosed(WindowId),

    /// The configured transport strategy cannot serve this window.
    #[error("Transport {mode} unsupported for window {window_id}")]
    Unsupported { window_id: WindowId, mode: String },

    /// The coordinating process is no longer accepting requests.
    #[error("Coordinating host unavailable")]
    HostUnavailable,
}

/// Transaction lifecycle violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// `start` while a transaction is already open (no nesting).
    #[error("Transaction already open for window {0}")]
    AlreadyOpen(WindowId),

    /// `commit`/`rollback` without an open transaction.
    #[error("No open transaction for window {0}")]
    NotOpen(WindowId),

    /// The staging buffer is full.
    #[error("Transaction exceeds {limit} staged operations")]
    TooManyOps { limit: usize },
}

/// Top-level error for every engine operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Write rejected by the permission gate.
    #[error("Permission denied for key '{key}': {reason}")]
    PermissionDenied {
        key: String,
        window_id: Option<WindowId>,
        reason: DenyReason,
    },

    /// Value cannot cross the process boundary.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl SyncError {
    /// The stable code reported to UI code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::Serialization(_) => ErrorCode::SerializationError,
            Self::Transport(_) => ErrorCode::TransportError,
            Self::Transaction(_) => ErrorCode::TransactionError,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
