//! Convenient re-exports for common ssh-sampler usage.
//!
//! ```ignore
//! use ssh_sampler::prelude::*;
//! ```

// Configuration
pub use crate::config::{SessionConfig, TerminalConfig, TrailingWait};
pub use crate::config::env::EnvOverrides;
pub use crate::config::file::SamplerFile;

// Error handling
pub use crate::error::{Result, SamplerError};

// Results
pub use crate::sampler::{CommandSampler, SampleResult, ScriptSampler};
pub use crate::types::{Dimensions, ExecutionResult};

// Authentication
pub use crate::auth::{AuthStrategy, HostKeyVerification};

// Execution
pub use crate::backend::Connector;
pub use crate::client::SshClient;
pub use crate::executor::run_command;
pub use crate::script::run_script;

// SSH backend
#[cfg(feature = "ssh")]
pub use crate::backend::ssh::RusshConnector;

// Sync wrapper
pub use crate::sync::block_on;
#[cfg(feature = "ssh")]
pub use crate::sync::SyncSshClient;
