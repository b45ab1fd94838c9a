//! A reusable handle for running several executions against one host.
//!
//! Every call still opens and closes its own connection; the client only
//! keeps the configuration and the connector together.

use std::time::Duration;

use crate::backend::Connector;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::types::ExecutionResult;
use crate::{executor, script};

/// Runs commands and scripts with a fixed configuration.
#[derive(Debug, Clone)]
pub struct SshClient<C> {
    connector: C,
    config: SessionConfig,
}

#[cfg(feature = "ssh")]
impl SshClient<crate::backend::ssh::RusshConnector> {
    /// A client that connects over SSH.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(crate::backend::ssh::RusshConnector::new(), config)
    }
}

impl<C: Connector> SshClient<C> {
    /// A client with a custom connector.
    #[must_use]
    pub const fn with_connector(connector: C, config: SessionConfig) -> Self {
        Self { connector, config }
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the connector.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Run one command with a trailing wait of `wait_secs`.
    pub async fn execute_command(&self, command: &str, wait_secs: u32) -> Result<ExecutionResult> {
        executor::run_command(&self.connector, &self.config, command, wait_secs).await
    }

    /// Run a script through an interactive shell.
    pub async fn execute_script(
        &self,
        script: &str,
        wait_enabled: bool,
        delay_after_each_command: Duration,
    ) -> Result<ExecutionResult> {
        script::run_script(
            &self.connector,
            &self.config,
            script,
            wait_enabled,
            delay_after_each_command,
        )
        .await
    }
}
