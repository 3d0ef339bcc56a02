//! Error types for hostsweep-inventory

use hostsweep_core::CollectError;
use hostsweep_exec::ExecError;
use thiserror::Error;

/// Errors raised while querying a host's inventory
#[derive(Error, Debug, Clone)]
pub enum InventoryError {
    /// osquery is not installed on the target system
    #[error("osquery not found: {0}")]
    OsqueryNotFound(String),

    /// Query ran and osquery reported failure
    #[error("query execution failed: {0}")]
    QueryFailed(String),

    #[error("SQL syntax error: {0}")]
    SqlSyntax(String),

    /// osquery output was not the JSON we expected
    #[error("JSON parse error: {0}")]
    ParseError(String),

    /// Transport failed before the query produced output
    #[error(transparent)]
    Execution(#[from] ExecError),

    /// Table not available on this system
    #[error("table not available: {0}")]
    TableNotAvailable(String),
}

impl From<InventoryError> for CollectError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Execution(exec) => CollectError::from(exec),
            other => CollectError::operation(other.to_string()),
        }
    }
}
