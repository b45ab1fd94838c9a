//! Logging setup.
//!
//! The library itself only emits `tracing` events. Binaries and test
//! harnesses that want them printed install a subscriber through
//! [`init`] or [`init_with`]; the filter honors `RUST_LOG`.

use tracing_subscriber::EnvFilter;

use crate::error::{Result, SamplerError};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "ssh_sampler=info";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Subscriber options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Output format.
    pub format: LogFormat,
    /// Filter directives used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Include the event target.
    pub with_target: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            default_filter: DEFAULT_FILTER.to_string(),
            with_target: true,
        }
    }
}

impl LogOptions {
    /// Set the output format.
    #[must_use]
    pub const fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the fallback filter.
    #[must_use]
    pub fn default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Build the filter: `RUST_LOG` if set, otherwise the fallback.
    pub fn filter(&self) -> Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_filter).map_err(|e| {
                SamplerError::config(format!(
                    "invalid log filter '{}': {e}",
                    self.default_filter
                ))
            }),
        }
    }
}

/// Install a text subscriber with the default filter.
pub fn init() -> Result<()> {
    init_with(&LogOptions::default())
}

/// Install a global subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_with(options: &LogOptions) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(options.filter()?)
        .with_target(options.with_target);
    let installed = match options.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| SamplerError::config(format!("installing log subscriber: {e}")))
}
