//! Engine error types
//!
//! Only resolution and report failures abort a run. Per-host failures are
//! [`CollectError`] values folded into a host's outcome.

use std::path::PathBuf;

use thiserror::Error;

use hostsweep_exec::ExecError;

/// Target specification could not be turned into a host list
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// Prefix lookup needed but neither a search base nor a domain is known
    #[error("no directory search root configured; cannot resolve prefix {0:?}")]
    NoSearchRoot(String),

    /// Host-list file could not be read
    #[error("cannot read host list {}: {source}", path.display())]
    HostFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory query for a prefix failed
    #[error("directory lookup for {prefix:?} failed: {source}")]
    Directory {
        prefix: String,
        #[source]
        source: DirectoryError,
    },
}

/// Directory-service query failures
#[derive(Error, Debug, Clone)]
pub enum DirectoryError {
    /// Query tool could not be run
    #[error("directory query could not run: {0}")]
    Unavailable(String),

    /// Server answered with an error
    #[error("directory query failed (status {status}): {message}")]
    QueryFailed { status: i32, message: String },

    /// Server stopped at its size limit; the partial list is not used
    #[error("directory results truncated by the server size limit after {returned} entries")]
    Truncated { returned: usize },

    /// Response could not be parsed
    #[error("malformed directory response: {0}")]
    Malformed(String),
}

/// Why a single host produced no rows
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectError {
    /// Host unreachable, refused the session, or did not answer in time
    #[error("{0}")]
    Connect(String),

    /// Host answered but the operation failed there
    #[error("{0}")]
    Operation(String),
}

impl CollectError {
    pub fn connect(detail: impl Into<String>) -> Self {
        Self::Connect(detail.into())
    }

    pub fn operation(detail: impl Into<String>) -> Self {
        Self::Operation(detail.into())
    }
}

impl From<ExecError> for CollectError {
    fn from(err: ExecError) -> Self {
        if err.is_transport() {
            Self::Connect(err.to_string())
        } else {
            Self::Operation(err.to_string())
        }
    }
}

/// Report output could not be produced
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("cannot write report {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write report to terminal: {0}")]
    Terminal(#[source] std::io::Error),
}
