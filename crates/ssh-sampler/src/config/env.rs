//! Environment-based configuration overrides.
//!
//! Variables are read as `{prefix}_{NAME}`, with the prefix defaulting to
//! `SSH_SAMPLER`. Unset variables leave the configuration untouched; set but
//! unparseable values are configuration errors.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::{Result, SamplerError};

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "SSH_SAMPLER";

/// Recognized variable names (without the prefix).
pub mod vars {
    /// Remote host.
    pub const HOSTNAME: &str = "HOSTNAME";
    /// Remote port.
    pub const PORT: &str = "PORT";
    /// Login user.
    pub const USERNAME: &str = "USERNAME";
    /// Password.
    pub const PASSWORD: &str = "PASSWORD";
    /// Private key file.
    pub const KEY_FILE: &str = "KEY_FILE";
    /// Key passphrase.
    pub const PASSPHRASE: &str = "PASSPHRASE";
    /// Connect timeout in milliseconds.
    pub const CONNECTION_TIMEOUT_MS: &str = "CONNECTION_TIMEOUT_MS";
    /// Output wait bound in milliseconds.
    pub const MAX_WAIT_MS: &str = "MAX_WAIT_MS";
    /// Terminal type.
    pub const TERM: &str = "TERM";
    /// Terminal columns.
    pub const TERM_WIDTH: &str = "TERM_WIDTH";
    /// Terminal rows.
    pub const TERM_HEIGHT: &str = "TERM_HEIGHT";
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable reader.
pub struct EnvOverrides {
    prefix: String,
    lookup: Lookup,
}

impl Default for EnvOverrides {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl std::fmt::Debug for EnvOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvOverrides")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl EnvOverrides {
    /// Read from the process environment with the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Read through a custom lookup function instead of the process
    /// environment.
    #[must_use]
    pub fn with_lookup<F>(prefix: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            lookup: Box::new(lookup),
        }
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(&self.var_name(name))
    }

    /// Get a parsed value. A set but malformed value is an error.
    pub fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
                SamplerError::config(format!("{}={raw:?}: {e}", self.var_name(name)))
            }),
        }
    }

    /// Get a duration in milliseconds.
    pub fn duration_millis(&self, name: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(name)?.map(Duration::from_millis))
    }

    /// Apply every set variable on top of `config`.
    pub fn apply(&self, mut config: SessionConfig) -> Result<SessionConfig> {
        if let Some(host) = self.get(vars::HOSTNAME) {
            config.hostname = host;
        }
        if let Some(port) = self.parse::<u16>(vars::PORT)? {
            config.port = port;
        }
        if let Some(user) = self.get(vars::USERNAME) {
            config.username = user;
        }
        if let Some(password) = self.get(vars::PASSWORD) {
            config.password = Some(password);
        }
        if let Some(key_file) = self.get(vars::KEY_FILE) {
            config.key_file = Some(PathBuf::from(key_file));
        }
        if let Some(passphrase) = self.get(vars::PASSPHRASE) {
            config.passphrase = Some(passphrase);
        }
        if let Some(timeout) = self.duration_millis(vars::CONNECTION_TIMEOUT_MS)? {
            config.connection_timeout = timeout;
        }
        if let Some(wait) = self.duration_millis(vars::MAX_WAIT_MS)? {
            config.max_wait_for_output = wait;
        }
        if let Some(term) = self.get(vars::TERM) {
            config.terminal.term = term;
        }
        if let Some(cols) = self.parse::<u16>(vars::TERM_WIDTH)? {
            config.terminal.dimensions.cols = cols;
        }
        if let Some(rows) = self.parse::<u16>(vars::TERM_HEIGHT)? {
            config.terminal.dimensions.rows = rows;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> EnvOverrides {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EnvOverrides::with_lookup(DEFAULT_PREFIX, move |name| map.get(name).cloned())
    }

    #[test]
    fn var_name_uses_prefix() {
        let env = overrides(&[]);
        assert_eq!(env.var_name("port"), "SSH_SAMPLER_PORT");
    }

    #[test]
    fn apply_overrides_set_values_only() {
        let env = overrides(&[
            ("SSH_SAMPLER_HOSTNAME", "load02"),
            ("SSH_SAMPLER_PORT", "2200"),
            ("SSH_SAMPLER_MAX_WAIT_MS", "750"),
            ("SSH_SAMPLER_TERM_WIDTH", "132"),
        ]);
        let config = env
            .apply(SessionConfig::new("load01").username("bench"))
            .unwrap();
        assert_eq!(config.hostname, "load02");
        assert_eq!(config.port, 2200);
        assert_eq!(config.username, "bench");
        assert_eq!(config.max_wait_for_output, Duration::from_millis(750));
        assert_eq!(config.terminal.dimensions.cols, 132);
        assert_eq!(config.terminal.dimensions.rows, 50);
    }

    #[test]
    fn malformed_value_is_config_error() {
        let env = overrides(&[("SSH_SAMPLER_PORT", "ssh")]);
        let err = env.apply(SessionConfig::new("h")).unwrap_err();
        assert!(matches!(err, SamplerError::Config { .. }));
        assert!(err.to_string().contains("SSH_SAMPLER_PORT"));
    }

    #[test]
    fn empty_environment_is_identity() {
        let env = overrides(&[]);
        let config = env.apply(SessionConfig::new("h").port(2022)).unwrap();
        assert_eq!(config.hostname, "h");
        assert_eq!(config.port, 2022);
    }
}
