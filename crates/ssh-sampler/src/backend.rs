//! Backend seam between the execution engine and the secure-session library.
//!
//! The engine only talks to these traits. The `ssh` feature provides the
//! russh implementation in [`ssh`]; the `mock` feature provides an in-process
//! fake in [`crate::mock`].
//!
//! A [`Connection`] hands out a session as two halves: a [`ChannelControl`]
//! the executor uses to start the remote process and feed its input, and an
//! [`EventSource`] the output drainer owns and reads from. The split is what
//! lets reading race writing without any shared state.

use std::future::Future;

use bytes::Bytes;

use crate::auth::AuthStrategy;
use crate::config::{SessionConfig, TerminalConfig};
use crate::error::Result;

#[cfg(feature = "ssh")]
pub mod ssh;

/// Something that can open a network connection to a remote host.
pub trait Connector: Send + Sync {
    /// The connection type produced.
    type Connection: Connection;

    /// Open the transport to `config.hostname:config.port`.
    ///
    /// Only the transport is established here; authentication is a separate
    /// step so the caller can own the connection before it is attempted.
    fn connect(
        &self,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// A live transport to a remote host.
pub trait Connection: Send + 'static {
    /// Control half of a session opened on this connection.
    type Control: ChannelControl;
    /// Read half of a session opened on this connection.
    type Source: EventSource;

    /// Attempt one authentication strategy.
    ///
    /// Returns `Ok(false)` when the remote peer rejects the credentials.
    fn authenticate(
        &mut self,
        username: &str,
        strategy: &AuthStrategy,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Open a session channel.
    fn open_session(
        &mut self,
    ) -> impl Future<Output = Result<(Self::Control, Self::Source)>> + Send;

    /// Close the connection.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// The write/control half of a session channel.
pub trait ChannelControl: Send + 'static {
    /// Request a pseudo-terminal with the given settings.
    fn request_pty(&mut self, terminal: &TerminalConfig)
    -> impl Future<Output = Result<()>> + Send;

    /// Start an interactive shell.
    fn start_shell(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Start remote execution of a command line.
    fn exec(&mut self, command: &str) -> impl Future<Output = Result<()>> + Send;

    /// Write bytes to the remote process's standard input and flush them.
    fn write_stdin(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Close the remote process's standard input (send EOF).
    fn close_stdin(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the session channel.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// An event observed on a session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Bytes on standard output.
    Stdout(Bytes),
    /// Bytes on standard error.
    Stderr(Bytes),
    /// The remote side will send no more data.
    Eof,
    /// The remote process exited with a status.
    ExitStatus(u32),
    /// The remote process was terminated by a signal.
    ExitSignal(String),
    /// The channel was closed by the remote side.
    Close,
}

/// The read half of a session channel.
pub trait EventSource: Send + 'static {
    /// Wait for the next event. `None` means the channel is gone.
    fn next_event(&mut self) -> impl Future<Output = Option<ChannelEvent>> + Send;

    /// Release the read side. Best-effort; the default does nothing.
    fn close(&mut self) {}
}
