//! Error types for hostsweep-exec

use std::time::Duration;

use thiserror::Error;

/// Errors raised while running a command on a host
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Could not open a transport connection to the host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connected, but the host rejected our credentials
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command ran and reported failure
    #[error("command failed with status {status}: {stderr}")]
    CommandFailed {
        /// Exit status code
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command did not finish in time
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// SSH identity could not be loaded
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Local process could not be spawned
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error while talking to the process or channel
    #[error("I/O error: {0}")]
    IoError(String),

    /// Session was used before being established
    #[error("not connected")]
    NotConnected,
}

impl ExecError {
    /// Whether the fault happened before the host accepted a session.
    ///
    /// Timeouts count as transport faults: the host never answered.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_)
                | ExecError::AuthenticationFailed(_)
                | ExecError::SshKeyError(_)
                | ExecError::NotConnected
                | ExecError::Timeout { .. }
        )
    }
}
