//! Executor trait shared by local and SSH transports

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// Something that can run a shell command on one host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command and wait for it to finish.
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a command, failing with [`ExecError::Timeout`] once `timeout` elapses.
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Release any session held by the executor.
    async fn disconnect(&self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Short transport name used in logs
    fn executor_type(&self) -> &'static str;
}
