//! Per-host transport selection

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hostsweep_core::is_local_sentinel;
use hostsweep_exec::{ExecError, KeySource, LocalExecutor, RemoteExecutor, SshExecutorBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `[ssh]` configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    /// Remote login; defaults to the invoking user
    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Private key; the usual `~/.ssh` identities are tried when unset
    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    15
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            port: default_port(),
            identity_file: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl SshConfig {
    fn key_source(&self) -> KeySource {
        match &self.identity_file {
            Some(path) => KeySource::Path(path.clone()),
            None => KeySource::Default,
        }
    }
}

/// Opens a transport for a host
pub trait ExecutorFactory: Send + Sync {
    /// # Errors
    /// Returns an [`ExecError`] when no transport can be prepared, for
    /// example because the SSH identity is unreadable.
    fn executor_for(&self, host: &str) -> Result<Arc<dyn RemoteExecutor>, ExecError>;
}

/// Local execution for the loopback sentinel, SSH for everything else
#[derive(Debug, Clone, Default)]
pub struct DefaultExecutorFactory {
    ssh: SshConfig,
}

impl DefaultExecutorFactory {
    pub fn new(ssh: SshConfig) -> Self {
        Self { ssh }
    }
}

impl ExecutorFactory for DefaultExecutorFactory {
    fn executor_for(&self, host: &str) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        if is_local_sentinel(host) {
            debug!(host = %host, "using local executor");
            return Ok(Arc::new(LocalExecutor::new()));
        }

        let executor = SshExecutorBuilder::new(host, self.ssh.user.clone())
            .with_port(self.ssh.port)
            .with_key_source(self.ssh.key_source())
            .with_connect_timeout(Duration::from_secs(self.ssh.connect_timeout_secs))
            .build()?;
        Ok(Arc::new(executor))
    }
}
