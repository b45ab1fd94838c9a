//! Common types used throughout ssh-sampler.

use bytes::Bytes;

/// Terminal dimensions requested for a pseudo-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// Width in columns.
    pub cols: u16,

    /// Height in rows.
    pub rows: u16,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Standard 80x24 terminal.
    pub const STANDARD: Self = Self::new(80, 24);

    /// The 200x50 geometry used by script sampling unless configured.
    pub const SCRIPT: Self = Self::new(200, 50);
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::SCRIPT
    }
}

impl From<(u16, u16)> for Dimensions {
    fn from((cols, rows): (u16, u16)) -> Self {
        Self::new(cols, rows)
    }
}

/// Outcome of one command or script execution.
///
/// Produced once per call and never modified afterwards. The exit status and
/// exit signal are whatever the remote peer reported before the session was
/// torn down, so either may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    exit_status: Option<u32>,
    exit_signal: Option<String>,
    stdout: Bytes,
    stderr: Option<Bytes>,
}

impl ExecutionResult {
    /// Create a result.
    ///
    /// `stderr` is `None` when the execution path does not surface standard
    /// error separately (interactive script sessions).
    #[must_use]
    pub const fn new(
        exit_status: Option<u32>,
        exit_signal: Option<String>,
        stdout: Bytes,
        stderr: Option<Bytes>,
    ) -> Self {
        Self {
            exit_status,
            exit_signal,
            stdout,
            stderr,
        }
    }

    /// Exit status reported by the remote peer.
    #[must_use]
    pub const fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    /// Exit signal reported by the remote peer.
    #[must_use]
    pub fn exit_signal(&self) -> Option<&str> {
        self.exit_signal.as_deref()
    }

    /// Raw standard output.
    #[must_use]
    pub const fn stdout(&self) -> &Bytes {
        &self.stdout
    }

    /// Raw standard error, if this execution path captured it.
    #[must_use]
    pub const fn stderr(&self) -> Option<&Bytes> {
        self.stderr.as_ref()
    }

    /// Standard output decoded as UTF-8 (lossy).
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded as UTF-8 (lossy).
    #[must_use]
    pub fn stderr_lossy(&self) -> Option<String> {
        self.stderr
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Check if the remote peer reported a zero exit status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_status, Some(0))
    }

    /// Take the result apart.
    #[must_use]
    pub fn into_parts(self) -> (Option<u32>, Option<String>, Bytes, Option<Bytes>) {
        (self.exit_status, self.exit_signal, self.stdout, self.stderr)
    }
}
