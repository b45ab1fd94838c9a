//! russh backend.
//!
//! One [`RusshConnection`] per execution call. The session channel is split
//! so the control half stays with the executor while the drainer task owns
//! the read half.

mod keys;
mod known_hosts;

use std::sync::Arc;

use bytes::Bytes;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, ChannelReadHalf, ChannelWriteHalf, Disconnect, Sig};

use super::{ChannelControl, ChannelEvent, Connection, Connector, EventSource};
use crate::auth::{AuthStrategy, HostKeyVerification};
use crate::config::{SessionConfig, TerminalConfig};
use crate::error::{Result, SamplerError};

pub use known_hosts::{KNOWN_HOSTS_ENV, KnownHostsFile, KnownHostsMatch, known_hosts_path};

fn channel_error(context: &str, err: russh::Error) -> SamplerError {
    SamplerError::execution(context, err.to_string())
}

/// Host key checks for one connection attempt.
struct ClientHandler {
    policy: HostKeyVerification,
    host: String,
    port: u16,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.policy {
            #[cfg(feature = "insecure-skip-verify")]
            HostKeyVerification::AcceptAll => {
                tracing::warn!(
                    host = %self.host,
                    "Accepting server key without verification (INSECURE)"
                );
                Ok(true)
            }
            HostKeyVerification::RejectUnknown => {
                tracing::debug!(host = %self.host, "Rejecting unknown host key");
                Ok(false)
            }
            HostKeyVerification::KnownHosts => {
                let file = KnownHostsFile::new(known_hosts_path());
                let found = file.verify(&self.host, self.port, server_public_key);
                Ok(found == KnownHostsMatch::Trusted)
            }
            HostKeyVerification::Tofu => {
                let file = KnownHostsFile::new(known_hosts_path());
                Ok(file.trust_on_first_use(&self.host, self.port, server_public_key))
            }
        }
    }
}

/// Opens SSH connections with russh.
#[derive(Clone, Default)]
pub struct RusshConnector {
    client_config: Arc<client::Config>,
}

impl std::fmt::Debug for RusshConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshConnector").finish_non_exhaustive()
    }
}

impl RusshConnector {
    /// A connector with russh's default client settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector with custom client settings (algorithms, keepalive, ...).
    #[must_use]
    pub fn with_client_config(client_config: client::Config) -> Self {
        Self {
            client_config: Arc::new(client_config),
        }
    }
}

impl Connector for RusshConnector {
    type Connection = RusshConnection;

    async fn connect(&self, config: &SessionConfig) -> Result<Self::Connection> {
        let handler = ClientHandler {
            policy: config.host_key_verification,
            host: config.hostname.clone(),
            port: config.port,
        };
        let addr = (config.hostname.as_str(), config.port);
        let handle = client::connect(Arc::clone(&self.client_config), addr, handler)
            .await
            .map_err(|e| {
                SamplerError::connection(
                    &config.hostname,
                    config.port,
                    config.auth_strategy().describe(),
                    e.to_string(),
                )
            })?;
        Ok(RusshConnection {
            handle,
            host: config.hostname.clone(),
            port: config.port,
        })
    }
}

/// An open russh transport.
pub struct RusshConnection {
    handle: Handle<ClientHandler>,
    host: String,
    port: u16,
}

impl RusshConnection {
    async fn authenticate_public_key(
        &mut self,
        username: &str,
        strategy: &AuthStrategy,
        key_file: &std::path::Path,
        passphrase: Option<&str>,
    ) -> Result<bool> {
        let key = keys::load_private_key(key_file, passphrase)
            .await
            .map_err(|reason| {
                SamplerError::connection(&self.host, self.port, strategy.describe(), reason)
            })?;
        let rsa_hash = self
            .handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let outcome = self
            .handle
            .authenticate_publickey(username, PrivateKeyWithHashAlg::new(key, rsa_hash))
            .await
            .map_err(|e| self.auth_error(strategy, e))?;
        Ok(outcome.success())
    }

    fn auth_error(&self, strategy: &AuthStrategy, err: russh::Error) -> SamplerError {
        SamplerError::connection(&self.host, self.port, strategy.describe(), err.to_string())
    }
}

impl Connection for RusshConnection {
    type Control = RusshControl;
    type Source = RusshSource;

    async fn authenticate(&mut self, username: &str, strategy: &AuthStrategy) -> Result<bool> {
        match strategy {
            AuthStrategy::Password(password) => {
                let outcome = self
                    .handle
                    .authenticate_password(username, password)
                    .await
                    .map_err(|e| self.auth_error(strategy, e))?;
                Ok(outcome.success())
            }
            AuthStrategy::PublicKey {
                key_file,
                passphrase,
            } => {
                self.authenticate_public_key(username, strategy, key_file, passphrase.as_deref())
                    .await
            }
            AuthStrategy::None => {
                let outcome = self
                    .handle
                    .authenticate_none(username)
                    .await
                    .map_err(|e| self.auth_error(strategy, e))?;
                Ok(outcome.success())
            }
        }
    }

    async fn open_session(&mut self) -> Result<(Self::Control, Self::Source)> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| channel_error("channel open failed", e))?;
        let (read, write) = channel.split();
        Ok((RusshControl { channel: write }, RusshSource { channel: read }))
    }

    async fn close(&mut self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| channel_error("disconnect failed", e))
    }
}

/// Write half of a russh session channel.
pub struct RusshControl {
    channel: ChannelWriteHalf<Msg>,
}

impl ChannelControl for RusshControl {
    async fn request_pty(&mut self, terminal: &TerminalConfig) -> Result<()> {
        self.channel
            .request_pty(
                false,
                &terminal.term,
                terminal.dimensions.cols.into(),
                terminal.dimensions.rows.into(),
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| channel_error("PTY request failed", e))
    }

    async fn start_shell(&mut self) -> Result<()> {
        self.channel
            .request_shell(false)
            .await
            .map_err(|e| channel_error("Shell request failed", e))
    }

    async fn exec(&mut self, command: &str) -> Result<()> {
        self.channel
            .exec(false, command)
            .await
            .map_err(|e| channel_error("Exec request failed", e))
    }

    async fn write_stdin(&mut self, data: &[u8]) -> Result<()> {
        self.channel
            .data(data)
            .await
            .map_err(|e| channel_error("Data send failed", e))
    }

    async fn close_stdin(&mut self) -> Result<()> {
        self.channel
            .eof()
            .await
            .map_err(|e| channel_error("EOF send failed", e))
    }

    async fn close(&mut self) -> Result<()> {
        self.channel
            .close()
            .await
            .map_err(|e| channel_error("Channel close failed", e))
    }
}

/// Read half of a russh session channel.
pub struct RusshSource {
    channel: ChannelReadHalf,
}

fn signal_name(signal: Sig) -> String {
    match signal {
        Sig::Custom(name) => name,
        other => format!("{other:?}"),
    }
}

impl EventSource for RusshSource {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let event = match self.channel.wait().await? {
                ChannelMsg::Data { data } => ChannelEvent::Stdout(Bytes::copy_from_slice(&data)),
                ChannelMsg::ExtendedData { data, ext: 1 } => {
                    ChannelEvent::Stderr(Bytes::copy_from_slice(&data))
                }
                ChannelMsg::Eof => ChannelEvent::Eof,
                ChannelMsg::ExitStatus { exit_status } => ChannelEvent::ExitStatus(exit_status),
                ChannelMsg::ExitSignal { signal_name: sig, .. } => {
                    ChannelEvent::ExitSignal(signal_name(sig))
                }
                ChannelMsg::Close => ChannelEvent::Close,
                other => {
                    tracing::trace!(message = ?other, "Ignoring channel message");
                    continue;
                }
            };
            return Some(event);
        }
    }
}
