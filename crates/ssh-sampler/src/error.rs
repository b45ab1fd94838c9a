//! Error types for ssh-sampler.
//!
//! Every hard failure of an execution call maps to one of three kinds:
//! connection (transport or authentication), execution (channel I/O), or
//! script parse (malformed `wait` directive). Configuration and plain I/O
//! errors cover the loading side. Close failures during cleanup never become
//! errors; they are logged and dropped.

use std::time::Duration;

use thiserror::Error;

/// The main error type for ssh-sampler operations.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// Transport connect failed, or the selected authentication strategy
    /// was rejected by the remote peer.
    #[error("failed to create SSH connection to {host}:{port} ({strategy}): {reason}")]
    Connection {
        /// The host that was dialed.
        host: String,
        /// The port that was dialed.
        port: u16,
        /// Description of the authentication strategy that was attempted.
        strategy: String,
        /// The reason for the failure.
        reason: String,
    },

    /// I/O failure while opening a session, writing input or reading output.
    #[error("{context}: {reason}")]
    Execution {
        /// What operation was being performed.
        context: String,
        /// The underlying failure.
        reason: String,
    },

    /// Malformed `wait` directive in a script.
    #[error("failed to parse time in wait command [{line}]: {reason}")]
    ScriptParse {
        /// The offending raw script line.
        line: String,
        /// Why the argument was rejected.
        reason: String,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ssh-sampler operations.
pub type Result<T> = std::result::Result<T, SamplerError>;

impl SamplerError {
    /// Create a connection error.
    pub fn connection(
        host: impl Into<String>,
        port: u16,
        strategy: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Connection {
            host: host.into(),
            port,
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error for a transport connect that timed out.
    pub fn connect_timeout(
        host: impl Into<String>,
        port: u16,
        strategy: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self::connection(
            host,
            port,
            strategy,
            format!("connect timed out after {duration:?}"),
        )
    }

    /// Create an execution error.
    pub fn execution(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Create a script parse error for the given raw line.
    pub fn script_parse(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ScriptParse {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Check if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }

    /// Check if this is a script parse error.
    #[must_use]
    pub const fn is_script_parse(&self) -> bool {
        matches!(self, Self::ScriptParse { .. })
    }

    /// Render the error and its whole `source()` chain, one cause per line.
    ///
    /// This is what a failed sample carries as its response data.
    #[must_use]
    pub fn render_chain(&self) -> String {
        use std::error::Error as _;
        use std::fmt::Write as _;

        let mut out = format!("{self}");
        let mut source = self.source();
        while let Some(cause) = source {
            let _ = write!(out, "\nCaused by: {cause}");
            source = cause.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_names_strategy() {
        let err = SamplerError::connection(
            "db01",
            2222,
            "authentication with public key",
            "rejected by server",
        );
        let msg = err.to_string();
        assert!(msg.contains("db01:2222"));
        assert!(msg.contains("authentication with public key"));
        assert!(msg.contains("rejected by server"));
        assert!(err.is_connection());
        assert!(!err.is_execution());
    }

    #[test]
    fn connect_timeout_mentions_duration() {
        let err = SamplerError::connect_timeout(
            "db01",
            22,
            "authentication with none",
            Duration::from_secs(3),
        );
        assert!(err.to_string().contains("3s"));
    }

    #[test]
    fn script_parse_includes_line() {
        let err = SamplerError::script_parse("wait abc", "invalid digit found in string");
        let msg = err.to_string();
        assert!(msg.contains("wait abc"));
        assert!(err.is_script_parse());
    }

    #[test]
    fn render_chain_includes_io_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = SamplerError::Io(io_err);
        let rendered = err.render_chain();
        assert!(rendered.starts_with("I/O error: pipe closed"));
    }

    #[test]
    fn render_chain_single_line_without_source() {
        let err = SamplerError::execution("Failed to open SSH session", "channel refused");
        assert_eq!(
            err.render_chain(),
            "Failed to open SSH session: channel refused"
        );
    }
}
