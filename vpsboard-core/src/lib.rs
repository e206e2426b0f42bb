//! Domain services for the instance control plane: authorization policy,
//! the instance registry and its lifecycle state machine, the capacity
//! ledger, snapshots and the audit trail. Persistence goes through the
//! [`Store`] trait; the HTTP surface lives in the API crate.

pub mod audit;
pub mod ledger;
pub mod memory;
pub mod policy;
pub mod registry;
pub mod snapshots;
pub mod store;

pub use store::Store;
