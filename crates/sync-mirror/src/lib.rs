//! # Sync Mirror - Per-Window State Replica
//!
//! The window-side half of state sync. A [`Mirror`] holds a cache of the keys
//! its window watches, dispatches pushed changes to watchers and message
//! listeners, and forwards every mutation to the coordinating process.
//!
//! ```text
//!   UI code ──get/set/update/watch──→ Mirror ──HostHandle──→ SyncHost
//!      ↑                                │ ↑
//!      └──────── WatchEvent ────────────┘ └──── Frame (port / fallback IPC)
//! ```
//!
//! Mutations return [`MutationResult`](sync_types::MutationResult) so callers
//! can branch on `success` without handling errors.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod cache;
pub mod mirror;
pub mod watchers;

pub use cache::{CachedValue, MirrorCache};
pub use mirror::Mirror;
pub use watchers::{ListenerHandle, MessageEvent, WatchEvent, WatchHandle};
