//! ssh-sampler: remote command and script sampling over SSH
//!
//! This crate runs a single command, or a multi-line script through an
//! interactive shell, on a remote host and captures standard output,
//! standard error, exit status and exit signal. The samplers in [`sampler`]
//! turn each run into a load-test sample.
//!
//! # Features
//!
//! - **Bounded execution**: output is drained concurrently with sending
//!   input, and every wait is bounded by the configured output wait
//! - **Exactly-once cleanup** of session and connection on every path
//! - **SSH backend** via russh (feature: `ssh`, default)
//! - **Mock backend** with a fake shell for testing (feature: `mock`)
//! - **File and environment configuration** (TOML or JSON)
//!
//! # Example
//!
//! ```ignore
//! use ssh_sampler::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SessionConfig::new("load01")
//!         .username("bench")
//!         .key_file("/home/bench/.ssh/id_ed25519");
//!     let client = SshClient::new(config);
//!     let result = client.execute_command("uptime", 1).await?;
//!     println!("{}", result.stdout_lossy());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod backend;
pub mod channel;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod drainer;
pub mod error;
pub mod executor;
pub mod logging;
pub mod prelude;
pub mod sampler;
pub mod script;
pub mod sync;
pub mod types;

/// Mock backend for testing.
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use auth::{AuthStrategy, HostKeyVerification};
pub use backend::{ChannelControl, ChannelEvent, Connection, Connector, EventSource};
#[cfg(feature = "ssh")]
pub use backend::ssh::RusshConnector;
pub use channel::{ChannelCondition, ChannelStreams, Readiness};
pub use cleanup::ResourceScope;
pub use client::SshClient;
pub use config::env::EnvOverrides;
pub use config::file::{ConfigLoader, SamplerFile};
pub use config::{SessionConfig, TerminalConfig, TrailingWait};
pub use error::{Result, SamplerError};
pub use executor::run_command;
pub use sampler::{CommandSampler, SampleResult, ScriptSampler};
pub use script::{ScriptStep, parse_script, run_script};
pub use sync::block_on;
#[cfg(feature = "ssh")]
pub use sync::SyncSshClient;
pub use types::{Dimensions, ExecutionResult};
