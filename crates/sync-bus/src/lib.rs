//! # Sync Bus - Coordinating-Process Engine
//!
//! Owns the single authoritative key/value store for a multi-window host and
//! keeps every window's mirror current.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  lifecycle   ┌──────────────┐  HostRequest  ┌──────────────────┐
//! │ Window       │ ───────────→ │ auto_register│ ────────────→ │ SyncHost         │
//! │ collaborator │              └──────────────┘               │  └─ MessageBus   │
//! └──────────────┘                                             │     ├─ domain/   │
//! ┌──────────────┐             HostRequest                     │     └─ transport/│
//! │ Mirrors      │ ──────────────────────────────────────────→ │                  │
//! │ (per window) │ ←────────── Frame (port or fallback IPC) ── │                  │
//! └──────────────┘                                             └──────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Run to completion:** one event loop owns the bus; no locks.
//! - **Per-window FIFO:** frames to one window arrive in send order.
//! - **Best-effort delivery:** a failed send never fails the mutation.
//! - **Batched commits:** one transaction commit is one fanout pass.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod config;
pub mod domain;
pub mod host;
pub mod lifecycle;
pub mod ports;
pub mod transport;

// Re-export main types
pub use bus::{MessageBus, MutationOutcome, WindowRegistration, WindowSnapshot};
pub use config::{
    ConfigError, SyncConfig, TransportMode, DEFAULT_FALLBACK_CHANNEL, DEFAULT_MAX_STAGED_OPS,
};
pub use domain::{FieldPermission, PermissionCheck};
pub use host::{HostHandle, HostRequest, SyncHost, Updater};
pub use lifecycle::{auto_register, WindowLifecycleEvent};
pub use ports::{GroupResolver, SystemTimeSource, TimeSource};
pub use transport::{
    window_channel, IpcPacket, TransportKind, TransportStats, WindowEndpoint, WindowInbox,
};

#[cfg(any(test, feature = "test-utils"))]
pub use ports::MockTimeSource;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_channel_name() {
        assert_eq!(DEFAULT_FALLBACK_CHANNEL, "state-sync:message");
        assert_eq!(SyncConfig::default().fallback_channel, DEFAULT_FALLBACK_CHANNEL);
    }
}
