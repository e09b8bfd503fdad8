//! Outbound ports: collaborators the engine consumes through narrow traits.

pub mod outbound;

pub use outbound::*;
