//! # State-Sync Test Suite
//!
//! Cross-crate scenarios driving a real host loop and real mirrors.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── scenarios.rs    # Round trip, permissions, transactions, watchers
//!     └── transports.rs   # Zero-copy vs fallback, self-notification, teardown
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sync-tests
//! cargo test -p sync-tests integration::transports::
//! ```

#![allow(unused_variables)]
#![allow(dead_code)]

pub mod integration;
