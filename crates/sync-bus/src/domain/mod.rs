//! Domain layer: the pieces of the engine that know nothing about windows'
//! transports or the host event loop.

pub mod events;
pub mod permissions;
pub mod store;
pub mod subscriptions;
pub mod transactions;

pub use events::{ChangeEvent, ChangeKind};
pub use permissions::{FieldPermission, PermissionCheck, PermissionManager};
pub use store::DataStore;
pub use subscriptions::SubscriptionRegistry;
pub use transactions::{StagedOp, Transaction, TransactionManager, TransactionState};
