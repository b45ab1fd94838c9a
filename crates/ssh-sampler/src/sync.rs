//! Blocking wrappers for callers without an async runtime.

use std::future::Future;
#[cfg(feature = "ssh")]
use std::time::Duration;

use tokio::runtime::Builder;
#[cfg(feature = "ssh")]
use tokio::runtime::Runtime;

#[cfg(feature = "ssh")]
use crate::backend::ssh::RusshConnector;
#[cfg(feature = "ssh")]
use crate::client::SshClient;
#[cfg(feature = "ssh")]
use crate::config::SessionConfig;
use crate::error::{Result, SamplerError};
#[cfg(feature = "ssh")]
use crate::types::ExecutionResult;

fn runtime() -> Result<tokio::runtime::Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SamplerError::Io)
}

/// Run a future to completion on a fresh current-thread runtime.
///
/// Must not be called from inside an async runtime.
pub fn block_on<F, T>(future: F) -> Result<T>
where
    F: Future<Output = T>,
{
    Ok(runtime()?.block_on(future))
}

/// A blocking SSH client.
#[cfg(feature = "ssh")]
pub struct SyncSshClient {
    runtime: Runtime,
    inner: SshClient<RusshConnector>,
}

#[cfg(feature = "ssh")]
impl SyncSshClient {
    /// Create a client with its own runtime.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Ok(Self {
            runtime: runtime()?,
            inner: SshClient::new(config),
        })
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        self.inner.config()
    }

    /// Run one command, blocking.
    pub fn execute_command(&self, command: &str, wait_secs: u32) -> Result<ExecutionResult> {
        self.runtime
            .block_on(self.inner.execute_command(command, wait_secs))
    }

    /// Run a script, blocking.
    pub fn execute_script(
        &self,
        script: &str,
        wait_enabled: bool,
        delay_after_each_command: Duration,
    ) -> Result<ExecutionResult> {
        self.runtime.block_on(self.inner.execute_script(
            script,
            wait_enabled,
            delay_after_each_command,
        ))
    }
}
