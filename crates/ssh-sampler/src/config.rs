//! Configuration types for ssh-sampler.
//!
//! A [`SessionConfig`] carries everything one execution call needs to reach
//! and authenticate against a remote host. It is built once per call and only
//! read afterwards. File and environment loading live in the [`file`] and
//! [`env`] submodules.

pub mod env;
pub mod file;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::{AuthStrategy, HostKeyVerification};
use crate::types::Dimensions;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Default transport connect timeout (30 seconds).
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on waiting for output (10 seconds).
pub const DEFAULT_MAX_WAIT_FOR_OUTPUT: Duration = Duration::from_secs(10);

/// Default terminal type requested for script sessions.
pub const DEFAULT_TERM: &str = "vt220";

/// Terminal settings for the pseudo-terminal requested by script execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalConfig {
    /// Terminal type (the remote `TERM`).
    pub term: String,
    /// Terminal geometry.
    pub dimensions: Dimensions,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            term: DEFAULT_TERM.to_string(),
            dimensions: Dimensions::default(),
        }
    }
}

impl TerminalConfig {
    /// Create a terminal configuration.
    #[must_use]
    pub fn new(term: impl Into<String>, cols: u16, rows: u16) -> Self {
        Self {
            term: term.into(),
            dimensions: Dimensions::new(cols, rows),
        }
    }
}

/// How the command path keeps the channel open after the command finishes.
///
/// Some servers close the channel as soon as the command exits, before all
/// buffered output is flushed, so a trailing `sleep` is appended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrailingWait {
    /// `"{cmd} && sleep {n}"`. When the command fails the sleep is skipped
    /// and the command's status is reported; when it succeeds the sleep's
    /// status is reported.
    #[default]
    Chained,

    /// `"{cmd}; __rc=$?; sleep {n}; exit $__rc"`. Always sleeps and always
    /// reports the command's own exit status.
    PreserveStatus,
}

impl TrailingWait {
    /// Build the remote command line for `command` and a trailing wait.
    #[must_use]
    pub fn wrap(self, command: &str, wait_secs: u32) -> String {
        match self {
            Self::Chained => format!("{command} && sleep {wait_secs}"),
            Self::PreserveStatus => {
                format!("{command}; __rc=$?; sleep {wait_secs}; exit $__rc")
            }
        }
    }
}

/// Connection, authentication and terminal parameters for one execution call.
#[derive(Clone)]
pub struct SessionConfig {
    /// Host to connect to.
    pub hostname: String,
    /// Port (default 22).
    pub port: u16,
    /// Username.
    pub username: String,
    /// Password; selects password authentication when non-blank.
    pub password: Option<String>,
    /// Private key file; selects public key authentication when non-blank
    /// and no password is set.
    pub key_file: Option<PathBuf>,
    /// Passphrase for an encrypted private key.
    pub passphrase: Option<String>,
    /// Bound on the transport connect.
    pub connection_timeout: Duration,
    /// Bound on each readiness wait and on joining the output drainer.
    pub max_wait_for_output: Duration,
    /// Pseudo-terminal settings (script execution only).
    pub terminal: TerminalConfig,
    /// Host key verification policy.
    pub host_key_verification: HostKeyVerification,
    /// Trailing wait style for the command path.
    pub trailing_wait: TrailingWait,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: None,
            key_file: None,
            passphrase: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            max_wait_for_output: DEFAULT_MAX_WAIT_FOR_OUTPUT,
            terminal: TerminalConfig::default(),
            host_key_verification: HostKeyVerification::default(),
            trailing_wait: TrailingWait::default(),
        }
    }
}

impl SessionConfig {
    /// Create a configuration for a host.
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Default::default()
        }
    }

    /// Set port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set username.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set private key file.
    #[must_use]
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Set key passphrase.
    #[must_use]
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Set connection timeout.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the bound on waiting for output.
    #[must_use]
    pub const fn max_wait_for_output(mut self, timeout: Duration) -> Self {
        self.max_wait_for_output = timeout;
        self
    }

    /// Set terminal settings.
    #[must_use]
    pub fn terminal(mut self, terminal: TerminalConfig) -> Self {
        self.terminal = terminal;
        self
    }

    /// Set host key verification.
    #[must_use]
    pub const fn host_key_verification(mut self, policy: HostKeyVerification) -> Self {
        self.host_key_verification = policy;
        self
    }

    /// Set the trailing wait style.
    #[must_use]
    pub const fn trailing_wait(mut self, style: TrailingWait) -> Self {
        self.trailing_wait = style;
        self
    }

    /// The authentication strategy selected by field presence.
    #[must_use]
    pub fn auth_strategy(&self) -> AuthStrategy {
        AuthStrategy::select(self)
    }

    /// Get the address string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// One-line endpoint description for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "[{}@{}:{}/?connectionTimeout={} &maxWaitTimeForOutput={}]",
            self.username,
            self.hostname,
            self.port,
            self.connection_timeout.as_millis(),
            self.max_wait_for_output.as_millis()
        )
    }

    /// Check the values that cannot work at all.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(crate::error::SamplerError::config("hostname is empty"));
        }
        if self.port == 0 {
            return Err(crate::error::SamplerError::config("port must be non-zero"));
        }
        Ok(())
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("key_file", &self.key_file)
            .field("connection_timeout", &self.connection_timeout)
            .field("max_wait_for_output", &self.max_wait_for_output)
            .field("terminal", &self.terminal)
            .field("host_key_verification", &self.host_key_verification)
            .field("trailing_wait", &self.trailing_wait)
            .finish()
    }
}
