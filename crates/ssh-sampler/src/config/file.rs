//! File-based configuration loading.
//!
//! A sampler file is TOML (or JSON) with four optional tables:
//!
//! ```toml
//! [connection]
//! hostname = "load01"
//! port = 22
//! username = "bench"
//! key_file = "/home/bench/.ssh/id_ed25519"
//! connection_timeout_ms = 30000
//! max_wait_ms = 10000
//! host_key_verification = "tofu"
//!
//! [terminal]
//! term = "vt220"
//! width = 200
//! height = 50
//!
//! [command]
//! command = "uptime"
//! wait_secs = 1
//!
//! [script]
//! script = """
//! cd /tmp
//! wait 2
//! ls
//! """
//! enable_wait_command = true
//! delay_after_each_command_ms = 0
//! ```
//!
//! Durations are milliseconds. Missing keys take the sampler defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::auth::HostKeyVerification;
use crate::config::{SessionConfig, TerminalConfig, TrailingWait};
use crate::error::{Result, SamplerError};
use crate::sampler::{CommandSampler, ScriptSampler};

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Detect format from path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    const fn extension(self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }
}

/// `[connection]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSection {
    /// Remote host.
    pub hostname: String,
    /// Remote port.
    pub port: Option<u16>,
    /// Login user.
    pub username: String,
    /// Password.
    pub password: Option<String>,
    /// Private key file.
    pub key_file: Option<PathBuf>,
    /// Key passphrase.
    pub passphrase: Option<String>,
    /// Transport connect bound.
    pub connection_timeout_ms: Option<u64>,
    /// Output wait bound, used when the sampler table has none.
    pub max_wait_ms: Option<u64>,
    /// Host key policy.
    pub host_key_verification: Option<HostKeyVerification>,
    /// Trailing wait style for commands.
    pub trailing_wait: Option<TrailingWait>,
}

/// `[terminal]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerminalSection {
    /// Terminal type.
    pub term: Option<String>,
    /// Columns.
    pub width: Option<u16>,
    /// Rows.
    pub height: Option<u16>,
}

/// `[command]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandSection {
    /// Sampler label.
    pub name: Option<String>,
    /// Command line.
    pub command: Option<String>,
    /// Seconds of trailing sleep.
    pub wait_secs: Option<u32>,
    /// Output wait bound for this sampler.
    pub max_wait_ms: Option<u64>,
}

/// `[script]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptSection {
    /// Sampler label.
    pub name: Option<String>,
    /// Script text.
    pub script: Option<String>,
    /// Whether `wait N` lines suspend.
    pub enable_wait_command: Option<bool>,
    /// Pause after each transmitted command.
    pub delay_after_each_command_ms: Option<u64>,
    /// Output wait bound for this sampler.
    pub max_wait_ms: Option<u64>,
}

/// A parsed sampler file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerFile {
    /// Connection parameters shared by both samplers.
    pub connection: ConnectionSection,
    /// Terminal settings (script sampler only).
    pub terminal: TerminalSection,
    /// Command sampler settings.
    pub command: Option<CommandSection>,
    /// Script sampler settings.
    pub script: Option<ScriptSection>,
}

impl SamplerFile {
    /// Parse TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SamplerError::config(format!("invalid TOML: {e}")))
    }

    /// Parse JSON text.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| SamplerError::config(format!("invalid JSON: {e}")))
    }

    /// Parse text in the given format.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => Self::from_toml_str(content),
            ConfigFormat::Json => Self::from_json_str(content),
        }
    }

    /// Load a file, detecting the format from its extension (TOML if unknown).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let format = ConfigFormat::from_path(path).unwrap_or(ConfigFormat::Toml);
        Self::parse(&content, format)
    }

    /// Build the session configuration, falling back to `default_max_wait`
    /// when neither the sampler table nor `[connection]` set one.
    pub fn session_config(
        &self,
        sampler_max_wait_ms: Option<u64>,
        default_max_wait: Duration,
    ) -> Result<SessionConfig> {
        let conn = &self.connection;
        if conn.port == Some(0) {
            return Err(SamplerError::config("port must be non-zero"));
        }

        let mut config = SessionConfig::new(conn.hostname.clone())
            .username(conn.username.clone())
            .max_wait_for_output(
                sampler_max_wait_ms
                    .or(conn.max_wait_ms)
                    .map_or(default_max_wait, Duration::from_millis),
            );
        config.password.clone_from(&conn.password);
        config.key_file.clone_from(&conn.key_file);
        config.passphrase.clone_from(&conn.passphrase);
        if let Some(port) = conn.port {
            config.port = port;
        }
        if let Some(ms) = conn.connection_timeout_ms {
            config.connection_timeout = Duration::from_millis(ms);
        }
        if let Some(policy) = conn.host_key_verification {
            config.host_key_verification = policy;
        }
        if let Some(style) = conn.trailing_wait {
            config.trailing_wait = style;
        }

        let defaults = TerminalConfig::default();
        config.terminal = TerminalConfig::new(
            self.terminal.term.clone().unwrap_or(defaults.term),
            self.terminal.width.unwrap_or(defaults.dimensions.cols),
            self.terminal.height.unwrap_or(defaults.dimensions.rows),
        );
        Ok(config)
    }

    /// Build a command sampler from `[connection]` and `[command]`.
    pub fn command_sampler(&self) -> Result<CommandSampler> {
        let section = self.command.clone().unwrap_or_default();
        let mut sampler = CommandSampler::default();
        sampler.connection =
            self.session_config(section.max_wait_ms, sampler.connection.max_wait_for_output)?;
        if let Some(name) = section.name {
            sampler.name = name;
        }
        if let Some(command) = section.command {
            sampler.command = command;
        }
        if let Some(wait_secs) = section.wait_secs {
            sampler.wait_secs = wait_secs;
        }
        Ok(sampler)
    }

    /// Build a script sampler from `[connection]`, `[terminal]` and `[script]`.
    pub fn script_sampler(&self) -> Result<ScriptSampler> {
        let section = self.script.clone().unwrap_or_default();
        let mut sampler = ScriptSampler::default();
        sampler.connection =
            self.session_config(section.max_wait_ms, sampler.connection.max_wait_for_output)?;
        if let Some(name) = section.name {
            sampler.name = name;
        }
        if let Some(script) = section.script {
            sampler.script = script;
        }
        if let Some(enabled) = section.enable_wait_command {
            sampler.enable_wait_command = enabled;
        }
        if let Some(ms) = section.delay_after_each_command_ms {
            sampler.delay_after_each_command = Duration::from_millis(ms);
        }
        Ok(sampler)
    }
}

/// Finds sampler files by name in a list of directories.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader searching the current directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            search_paths: vec![PathBuf::from(".")],
        }
    }

    /// Add a search path.
    #[must_use]
    pub fn add_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Find `name`, trying it as given and then with each known extension.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        for dir in &self.search_paths {
            let exact = dir.join(name);
            if exact.is_file() {
                return Some(exact);
            }
            for format in [ConfigFormat::Toml, ConfigFormat::Json] {
                let candidate = dir.join(format!("{name}.{}", format.extension()));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Find and load a sampler file by name.
    pub fn load_by_name(&self, name: &str) -> Result<SamplerFile> {
        let path = self
            .find(name)
            .ok_or_else(|| SamplerError::config(format!("config file not found: {name}")))?;
        SamplerFile::load(&path)
    }
}
