//! hostsweep-inventory: collection operations
//!
//! Concrete [`CollectionOperation`](hostsweep_core::CollectionOperation)s
//! that query hosts through osquery or plain shell commands, and the
//! factory that picks a transport for each host.

pub mod error;
pub mod factory;
pub mod operations;
pub mod osquery;
pub mod query;

pub use error::InventoryError;
pub use factory::{DefaultExecutorFactory, ExecutorFactory, SshConfig};
pub use operations::{AssetInfoOperation, CommandOperation, InstalledSoftwareOperation};
pub use osquery::OsqueryClient;
pub use query::Query;
