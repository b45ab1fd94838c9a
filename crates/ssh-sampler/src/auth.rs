//! Authentication strategy selection and connection establishment.
//!
//! Exactly one strategy is attempted per call, chosen by field presence on
//! the [`SessionConfig`]: a non-blank password wins, then a non-blank key
//! file, then username-only ("none") authentication.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::backend::{Connection, Connector};
use crate::cleanup::ResourceScope;
use crate::config::SessionConfig;
use crate::error::{Result, SamplerError};

/// The authentication strategy attempted for one connection.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Username and password.
    Password(String),
    /// Username and private key file.
    PublicKey {
        /// Private key path.
        key_file: PathBuf,
        /// Passphrase for the key (if encrypted).
        passphrase: Option<String>,
    },
    /// Username only.
    None,
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

impl AuthStrategy {
    /// Select the strategy for a configuration.
    #[must_use]
    pub fn select(config: &SessionConfig) -> Self {
        if let Some(password) = config.password.as_deref().filter(|p| !is_blank(p)) {
            return Self::Password(password.to_string());
        }
        if let Some(key_file) = config
            .key_file
            .as_ref()
            .filter(|k| !is_blank(&k.to_string_lossy()))
        {
            return Self::PublicKey {
                key_file: key_file.clone(),
                passphrase: config.passphrase.clone().filter(|p| !p.is_empty()),
            };
        }
        Self::None
    }

    /// Human-readable name, embedded in diagnostics and connection errors.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Password(_) => "authentication with password",
            Self::PublicKey { .. } => "authentication with public key",
            Self::None => "authentication with none",
        }
    }

    /// Check if this is password auth.
    #[must_use]
    pub const fn is_password(&self) -> bool {
        matches!(self, Self::Password(_))
    }

    /// Check if this is public key auth.
    #[must_use]
    pub const fn is_public_key(&self) -> bool {
        matches!(self, Self::PublicKey { .. })
    }
}

impl fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(..)"),
            Self::PublicKey { key_file, .. } => f
                .debug_struct("PublicKey")
                .field("key_file", key_file)
                .finish_non_exhaustive(),
            Self::None => f.write_str("None"),
        }
    }
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Host key verification policy.
///
/// # Security
///
/// The default policy is `KnownHosts`, which checks the server's key against
/// the user's `known_hosts` file (or `$SSH_KNOWN_HOSTS`).
///
/// The `AcceptAll` variant is only available when the `insecure-skip-verify`
/// feature is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum HostKeyVerification {
    /// Accept all keys without verification.
    #[cfg(feature = "insecure-skip-verify")]
    AcceptAll,
    /// Reject every key.
    RejectUnknown,
    /// Check the key against `known_hosts`.
    #[default]
    KnownHosts,
    /// Trust on first use: accept and record unknown hosts, reject mismatches.
    Tofu,
}

/// Open the transport and authenticate with the selected strategy.
///
/// The connection is handed to `scope` as soon as the transport is up, so a
/// rejected login is still closed by the caller's cleanup. On success the
/// authenticated connection is available through
/// [`ResourceScope::connection_mut`].
pub async fn establish<C: Connector>(
    connector: &C,
    config: &SessionConfig,
    scope: &mut ResourceScope<C::Connection>,
) -> Result<()> {
    let strategy = AuthStrategy::select(config);
    let described = strategy.describe();

    tracing::debug!(
        host = %config.hostname,
        port = config.port,
        strategy = described,
        "Creating SSH connection"
    );

    let connection =
        match tokio::time::timeout(config.connection_timeout, connector.connect(config)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(as_connection_error(e, config, described)),
            Err(_) => {
                return Err(SamplerError::connect_timeout(
                    &config.hostname,
                    config.port,
                    described,
                    config.connection_timeout,
                ));
            }
        };

    let connection = scope.adopt_connection(connection);
    match connection.authenticate(&config.username, &strategy).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(SamplerError::connection(
                &config.hostname,
                config.port,
                described,
                format!("{described} rejected for user {}", config.username),
            ));
        }
        Err(e) => return Err(as_connection_error(e, config, described)),
    }

    tracing::info!(
        host = %config.hostname,
        port = config.port,
        user = %config.username,
        strategy = described,
        "SSH connection created with {described} {}",
        config.describe()
    );
    Ok(())
}

fn as_connection_error(err: SamplerError, config: &SessionConfig, strategy: &str) -> SamplerError {
    match err {
        already @ SamplerError::Connection { .. } => already,
        other => {
            SamplerError::connection(&config.hostname, config.port, strategy, other.to_string())
        }
    }
}
