//! hostsweep-exec: command transport for collection operations
//!
//! Runs shell commands on the local machine or on a remote host over SSH.
//! Collection operations use this crate to reach a host; the engine only sees
//! the resulting rows or errors.

pub mod error;
pub mod keys;
pub mod local;
pub mod result;
pub mod shell;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use keys::{KeyError, KeySource};
pub use local::LocalExecutor;
pub use result::{CommandResult, ConnectionInfo};
pub use ssh::{SshExecutor, SshExecutorBuilder};
pub use traits::RemoteExecutor;
