//! Samplers: the boundary a load-testing harness calls.
//!
//! A sampler runs one command or script and turns the outcome, success or
//! failure, into a [`SampleResult`]. Errors never escape a sampler; they
//! become a failed sample with response code `-1`.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::backend::Connector;
use crate::config::{SessionConfig, TerminalConfig};
use crate::error::{Result, SamplerError};
use crate::types::ExecutionResult;
use crate::{executor, script};

/// Default label of a [`CommandSampler`].
pub const COMMAND_SAMPLER_NAME: &str = "SSH2 Command Sampler";

/// Default label of a [`ScriptSampler`].
pub const SCRIPT_SAMPLER_NAME: &str = "SSH2 Script Sampler";

/// Default command.
pub const DEFAULT_COMMAND: &str = "date";

/// Default trailing wait after a command, in seconds.
pub const DEFAULT_WAIT_SECS: u32 = 1;

/// Default output wait bound for commands.
pub const COMMAND_MAX_WAIT: Duration = Duration::from_millis(5000);

/// Default output wait bound for scripts.
pub const SCRIPT_MAX_WAIT: Duration = Duration::from_millis(30000);

/// Encoding of all textual response data.
pub const RESPONSE_DATA_ENCODING: &str = "UTF-8";

/// Declared data type of response data.
pub const RESPONSE_DATA_TYPE: &str = "text";

/// Declared content type of response data.
pub const RESPONSE_CONTENT_TYPE: &str = "text/plain";

/// Response code of a failed sample.
pub const FAILURE_CODE: &str = "-1";

/// Rendering of an absent value in messages and codes.
const NULL: &str = "null";

/// The reported outcome of one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleResult {
    /// Sampler label.
    pub label: String,
    /// What was sent: the command or the script text.
    pub sampler_data: String,
    /// Whether the execution completed.
    pub success: bool,
    /// Exit status, `null` if none was reported, `-1` on failure.
    pub response_code: String,
    /// Exit signal and standard error, or the failure.
    pub response_message: String,
    /// Standard output, or the rendered failure.
    #[serde(serialize_with = "serialize_lossy")]
    pub response_data: Bytes,
    /// Encoding of `response_data`.
    pub data_encoding: &'static str,
    /// Data type of `response_data`.
    pub data_type: &'static str,
    /// Content type of `response_data`.
    pub content_type: &'static str,
    /// When the sample started.
    #[serde(rename = "start_ms", serialize_with = "serialize_epoch_millis")]
    pub start: SystemTime,
    /// How long the sample took.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_lossy<S: Serializer>(
    data: &Bytes,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(data))
}

fn serialize_epoch_millis<S: Serializer>(
    time: &SystemTime,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64);
    serializer.serialize_u64(millis)
}

fn serialize_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl SampleResult {
    fn base(label: &str, sampler_data: &str, start: SystemTime, elapsed: Duration) -> Self {
        Self {
            label: label.to_string(),
            sampler_data: sampler_data.to_string(),
            success: false,
            response_code: String::new(),
            response_message: String::new(),
            response_data: Bytes::new(),
            data_encoding: RESPONSE_DATA_ENCODING,
            data_type: RESPONSE_DATA_TYPE,
            content_type: RESPONSE_CONTENT_TYPE,
            start,
            elapsed,
        }
    }

    /// A successful sample from an execution result.
    #[must_use]
    pub fn from_execution(
        label: &str,
        sampler_data: &str,
        start: SystemTime,
        elapsed: Duration,
        result: &ExecutionResult,
    ) -> Self {
        let stderr = result.stderr_lossy();
        Self {
            success: true,
            response_code: result
                .exit_status()
                .map_or_else(|| NULL.to_string(), |s| s.to_string()),
            response_message: format!(
                "ExitSignal:[{}], StdErr:[{}]",
                result.exit_signal().unwrap_or(NULL),
                stderr.as_deref().unwrap_or(NULL)
            ),
            response_data: result.stdout().clone(),
            ..Self::base(label, sampler_data, start, elapsed)
        }
    }

    /// A failed sample from an error.
    #[must_use]
    pub fn from_error(
        label: &str,
        sampler_data: &str,
        start: SystemTime,
        elapsed: Duration,
        error: &SamplerError,
    ) -> Self {
        Self {
            success: false,
            response_code: FAILURE_CODE.to_string(),
            response_message: format!("Exception: {error}"),
            response_data: Bytes::from(error.render_chain()),
            ..Self::base(label, sampler_data, start, elapsed)
        }
    }

    fn from_outcome(
        label: &str,
        sampler_data: &str,
        start: SystemTime,
        elapsed: Duration,
        outcome: Result<ExecutionResult>,
    ) -> Self {
        let sample = match outcome {
            Ok(result) => Self::from_execution(label, sampler_data, start, elapsed, &result),
            Err(error) => {
                tracing::warn!(label, error = %error, "Sample failed");
                Self::from_error(label, sampler_data, start, elapsed, &error)
            }
        };
        tracing::debug!(
            label,
            success = sample.success,
            code = %sample.response_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "Sample finished"
        );
        sample
    }

    /// Response data decoded as UTF-8 (lossy).
    #[must_use]
    pub fn response_data_str(&self) -> String {
        String::from_utf8_lossy(&self.response_data).into_owned()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SamplerError::config(format!("serializing sample: {e}")))
    }
}

/// Runs one command per sample.
#[derive(Debug, Clone)]
pub struct CommandSampler {
    /// Sample label.
    pub name: String,
    /// Connection settings.
    pub connection: SessionConfig,
    /// Command to run.
    pub command: String,
    /// Seconds of trailing wait after the command.
    pub wait_secs: u32,
}

impl Default for CommandSampler {
    fn default() -> Self {
        Self {
            name: COMMAND_SAMPLER_NAME.to_string(),
            connection: SessionConfig::default().max_wait_for_output(COMMAND_MAX_WAIT),
            command: DEFAULT_COMMAND.to_string(),
            wait_secs: DEFAULT_WAIT_SECS,
        }
    }
}

impl CommandSampler {
    /// A sampler with default settings for the given connection.
    #[must_use]
    pub fn new(connection: SessionConfig) -> Self {
        Self {
            connection,
            ..Self::default()
        }
    }

    /// Set the label.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the command.
    #[must_use]
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Set the trailing wait.
    #[must_use]
    pub const fn wait_secs(mut self, wait_secs: u32) -> Self {
        self.wait_secs = wait_secs;
        self
    }

    /// Take one sample through `connector`.
    pub async fn sample_with<C: Connector>(&self, connector: &C) -> SampleResult {
        let start = SystemTime::now();
        let clock = Instant::now();
        let outcome =
            executor::run_command(connector, &self.connection, &self.command, self.wait_secs).await;
        SampleResult::from_outcome(&self.name, &self.command, start, clock.elapsed(), outcome)
    }

    /// Take one sample over SSH.
    #[cfg(feature = "ssh")]
    pub async fn sample_async(&self) -> SampleResult {
        self.sample_with(&crate::backend::ssh::RusshConnector::new())
            .await
    }

    /// Take one sample over SSH, blocking the calling thread.
    ///
    /// Must not be called from inside an async runtime.
    #[cfg(feature = "ssh")]
    #[must_use]
    pub fn sample(&self) -> SampleResult {
        blocking(&self.name, &self.command, || self.sample_async())
    }
}

/// Runs one script per sample.
#[derive(Debug, Clone)]
pub struct ScriptSampler {
    /// Sample label.
    pub name: String,
    /// Connection settings, including the terminal requested for the shell.
    pub connection: SessionConfig,
    /// Script text.
    pub script: String,
    /// Whether `wait N` lines pause input.
    pub enable_wait_command: bool,
    /// Pause after each transmitted command.
    pub delay_after_each_command: Duration,
}

impl Default for ScriptSampler {
    fn default() -> Self {
        Self {
            name: SCRIPT_SAMPLER_NAME.to_string(),
            connection: SessionConfig::default()
                .max_wait_for_output(SCRIPT_MAX_WAIT)
                .terminal(TerminalConfig::default()),
            script: String::new(),
            enable_wait_command: true,
            delay_after_each_command: Duration::ZERO,
        }
    }
}

impl ScriptSampler {
    /// A sampler with default settings for the given connection.
    #[must_use]
    pub fn new(connection: SessionConfig) -> Self {
        Self {
            connection,
            ..Self::default()
        }
    }

    /// Set the label.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the script text.
    #[must_use]
    pub fn script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }

    /// Enable or disable `wait N` directives.
    #[must_use]
    pub const fn enable_wait_command(mut self, enabled: bool) -> Self {
        self.enable_wait_command = enabled;
        self
    }

    /// Set the pause after each command.
    #[must_use]
    pub const fn delay_after_each_command(mut self, delay: Duration) -> Self {
        self.delay_after_each_command = delay;
        self
    }

    /// Take one sample through `connector`.
    pub async fn sample_with<C: Connector>(&self, connector: &C) -> SampleResult {
        let start = SystemTime::now();
        let clock = Instant::now();
        let outcome = script::run_script(
            connector,
            &self.connection,
            &self.script,
            self.enable_wait_command,
            self.delay_after_each_command,
        )
        .await;
        SampleResult::from_outcome(&self.name, &self.script, start, clock.elapsed(), outcome)
    }

    /// Take one sample over SSH.
    #[cfg(feature = "ssh")]
    pub async fn sample_async(&self) -> SampleResult {
        self.sample_with(&crate::backend::ssh::RusshConnector::new())
            .await
    }

    /// Take one sample over SSH, blocking the calling thread.
    ///
    /// Must not be called from inside an async runtime.
    #[cfg(feature = "ssh")]
    #[must_use]
    pub fn sample(&self) -> SampleResult {
        blocking(&self.name, &self.script, || self.sample_async())
    }
}

#[cfg(feature = "ssh")]
fn blocking<F, Fut>(label: &str, sampler_data: &str, sample: F) -> SampleResult
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = SampleResult>,
{
    let start = SystemTime::now();
    match crate::sync::block_on(sample()) {
        Ok(result) => result,
        Err(error) => SampleResult::from_error(
            label,
            sampler_data,
            start,
            start.elapsed().unwrap_or_default(),
            &error,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockServer;

    fn connection() -> SessionConfig {
        SessionConfig::new("mock").username("bench")
    }

    #[test]
    fn command_sampler_defaults() {
        let sampler = CommandSampler::default();
        assert_eq!(sampler.name, "SSH2 Command Sampler");
        assert_eq!(sampler.command, "date");
        assert_eq!(sampler.wait_secs, 1);
        assert_eq!(sampler.connection.max_wait_for_output, Duration::from_millis(5000));
        assert_eq!(sampler.connection.port, 22);
    }

    #[test]
    fn script_sampler_defaults() {
        let sampler = ScriptSampler::default();
        assert_eq!(sampler.name, "SSH2 Script Sampler");
        assert!(sampler.enable_wait_command);
        assert_eq!(sampler.delay_after_each_command, Duration::ZERO);
        assert_eq!(sampler.connection.max_wait_for_output, Duration::from_millis(30000));
        assert_eq!(sampler.connection.terminal.term, "vt220");
        assert_eq!(sampler.connection.terminal.dimensions.cols, 200);
        assert_eq!(sampler.connection.terminal.dimensions.rows, 50);
    }

    #[test]
    fn absent_values_render_as_null() {
        let result = ExecutionResult::new(None, None, Bytes::from_static(b"out"), None);
        let sample =
            SampleResult::from_execution("l", "d", SystemTime::now(), Duration::ZERO, &result);
        assert!(sample.success);
        assert_eq!(sample.response_code, "null");
        assert_eq!(sample.response_message, "ExitSignal:[null], StdErr:[null]");
        assert_eq!(sample.response_data_str(), "out");
        assert_eq!(sample.data_encoding, "UTF-8");
        assert_eq!(sample.content_type, "text/plain");
    }

    #[test]
    fn error_sample_shape() {
        let err = SamplerError::connection("h", 22, "authentication with none", "refused");
        let sample = SampleResult::from_error("l", "d", SystemTime::now(), Duration::ZERO, &err);
        assert!(!sample.success);
        assert_eq!(sample.response_code, "-1");
        assert!(sample.response_message.starts_with("Exception: failed to create SSH connection"));
        assert_eq!(sample.response_data_str(), err.render_chain());
    }

    #[test]
    fn sample_serializes_to_json() {
        let result = ExecutionResult::new(
            Some(0),
            None,
            Bytes::from_static(b"hi\n"),
            Some(Bytes::new()),
        );
        let sample = SampleResult::from_execution(
            "l",
            "echo hi",
            UNIX_EPOCH + Duration::from_millis(1500),
            Duration::from_millis(42),
            &result,
        );
        let json: serde_json::Value = serde_json::from_str(&sample.to_json().unwrap()).unwrap();
        assert_eq!(json["response_code"], "0");
        assert_eq!(json["response_data"], "hi\n");
        assert_eq!(json["start_ms"], 1500);
        assert_eq!(json["elapsed_ms"], 42);
        assert_eq!(json["response_message"], "ExitSignal:[null], StdErr:[]");
    }

    #[tokio::test]
    async fn command_sample_through_mock() {
        let sampler = CommandSampler::new(connection()).command("echo hi").wait_secs(0);
        let sample = sampler.sample_with(&MockServer::new()).await;
        assert!(sample.success);
        assert_eq!(sample.response_code, "0");
        assert_eq!(sample.response_data_str(), "hi\n");
        assert_eq!(sample.sampler_data, "echo hi");
        assert_eq!(sample.label, "SSH2 Command Sampler");
    }

    #[tokio::test]
    async fn script_sample_has_null_stderr() {
        let sampler = ScriptSampler::new(connection().max_wait_for_output(Duration::from_secs(1)))
            .script("echo a\nexit 0");
        let sample = sampler.sample_with(&MockServer::new()).await;
        assert!(sample.success);
        assert_eq!(sample.response_message, "ExitSignal:[null], StdErr:[null]");
        assert_eq!(sample.response_data_str(), "a\n");
    }

    #[tokio::test]
    async fn failure_becomes_failed_sample() {
        let sampler = CommandSampler::new(connection()).command("echo hi");
        let sample = sampler
            .sample_with(&MockServer::new().refuse_connection())
            .await;
        assert!(!sample.success);
        assert_eq!(sample.response_code, "-1");
        assert!(sample.response_data_str().contains("connection refused"));
    }
}
