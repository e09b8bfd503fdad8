//! # Sync Types Crate
//!
//! This crate contains the identifiers, store entries, wire envelope and
//! error taxonomy shared by the coordinating process (`sync-bus`) and the
//! per-window mirrors (`sync-mirror`).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses the process boundary
//!   is defined here.
//! - **Stable Envelope**: the `Envelope` shape is identical regardless of which
//!   transport strategy carried it.
//! - **Flat Keys**: keys are opaque strings. `"user.name"` and `"user"` are
//!   unrelated keys; no path semantics are applied anywhere.

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod result;

pub use entities::*;
pub use envelope::{ClearedKey, Envelope, EnvelopeKind, Frame, TaggedFrame};
pub use errors::*;
pub use result::{ErrorInfo, MutationResult};
