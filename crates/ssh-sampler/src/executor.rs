//! Single-command execution.
//!
//! Opens an exec channel, starts the output drainer before the command is
//! sent, and joins the drainer with the output wait bound. Cleanup runs on
//! every path.

use std::time::Duration;

use crate::auth;
use crate::backend::{ChannelControl, Connection, Connector, EventSource};
use crate::channel::ChannelStreams;
use crate::cleanup::ResourceScope;
use crate::config::SessionConfig;
use crate::drainer::{DrainReport, OutputDrainer, StopReason};
use crate::error::{Result, SamplerError};
use crate::types::ExecutionResult;

/// Longest the executor keeps listening for an exit status after
/// end-of-stream.
pub const EXIT_STATUS_GRACE: Duration = Duration::from_secs(2);

/// Run `command` on the remote host with a trailing wait of `wait_secs`.
///
/// The remote command line is built by
/// [`TrailingWait::wrap`](crate::config::TrailingWait::wrap). Standard
/// error is always present in the result, possibly empty.
pub async fn run_command<C: Connector>(
    connector: &C,
    config: &SessionConfig,
    command: &str,
    wait_secs: u32,
) -> Result<ExecutionResult> {
    config.validate()?;
    let mut scope = ResourceScope::new();
    let outcome = command_in_scope(connector, config, command, wait_secs, &mut scope).await;
    scope.release().await;
    outcome
}

async fn command_in_scope<C: Connector>(
    connector: &C,
    config: &SessionConfig,
    command: &str,
    wait_secs: u32,
    scope: &mut ResourceScope<C::Connection>,
) -> Result<ExecutionResult> {
    auth::establish(connector, config, scope).await?;

    let (control, source) = open_session(scope, "Failed to open SSH session").await?;
    let control = scope.adopt_session(control);
    let drainer = OutputDrainer::new(config.max_wait_for_output).spawn(ChannelStreams::new(source));

    tracing::info!("{}", config.describe());
    tracing::info!(command, ">>command: {command}");
    let remote_command = config.trailing_wait.wrap(command, wait_secs);
    control
        .exec(&remote_command)
        .await
        .map_err(|e| with_context(format!("Failed to execute command:[{command}]"), e))?;

    let report = drainer.join(config.max_wait_for_output).await?;
    Ok(finish(report, config.max_wait_for_output, true).await)
}

/// Open a session on the scope's connection.
pub(crate) async fn open_session<C: Connection>(
    scope: &mut ResourceScope<C>,
    context: &str,
) -> Result<(C::Control, C::Source)> {
    let connection = scope
        .connection_mut()
        .ok_or_else(|| SamplerError::execution(context, "no connection"))?;
    connection
        .open_session()
        .await
        .map_err(|e| with_context(context, e))
}

/// Attach a context to a backend error, keeping execution errors as they are.
pub(crate) fn with_context(context: impl Into<String>, err: SamplerError) -> SamplerError {
    match err {
        already @ SamplerError::Execution { .. } => already,
        other => SamplerError::execution(context, other.to_string()),
    }
}

/// Build the result from a finished drainer.
///
/// After a clean end-of-stream the exit status usually follows shortly, so
/// events are consumed for at most `min(max_wait, EXIT_STATUS_GRACE)` until
/// it arrives.
pub(crate) async fn finish<S: EventSource>(
    report: DrainReport<S>,
    max_wait: Duration,
    keep_stderr: bool,
) -> ExecutionResult {
    let DrainReport {
        output,
        mut streams,
        stop,
    } = report;

    if stop == StopReason::EndOfStream
        && streams.exit_status().is_none()
        && streams.exit_signal().is_none()
    {
        streams.wait_for_exit(max_wait.min(EXIT_STATUS_GRACE)).await;
    }

    let (stdout, stderr) = output.freeze();
    let (exit_status, exit_signal) = streams.into_exit();
    tracing::debug!(
        ?exit_status,
        ?exit_signal,
        stdout_bytes = stdout.len(),
        stderr_bytes = stderr.len(),
        ?stop,
        "Execution finished"
    );
    ExecutionResult::new(
        exit_status,
        exit_signal,
        stdout,
        keep_stderr.then_some(stderr),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::config::TrailingWait;
    use crate::mock::{MockServer, MockTimeline};

    fn config() -> SessionConfig {
        SessionConfig::new("mock")
            .username("bench")
            .max_wait_for_output(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn echo_hi() {
        let server = MockServer::new();
        let result = run_command(&server, &config(), "echo hi", 0).await.unwrap();
        assert_eq!(result.exit_status(), Some(0));
        assert_eq!(result.stdout_lossy(), "hi\n");
        assert_eq!(result.stderr_lossy().as_deref(), Some(""));
        assert_eq!(
            server.probe().snapshot().commands,
            vec!["echo hi && sleep 0"]
        );
    }

    #[tokio::test]
    async fn stderr_is_captured_separately() {
        let server = MockServer::new();
        let result = run_command(&server, &config(), "echo oops >&2", 0)
            .await
            .unwrap();
        assert_eq!(result.stdout_lossy(), "");
        assert_eq!(result.stderr_lossy().as_deref(), Some("oops\n"));
    }

    #[tokio::test]
    async fn chained_wait_reports_command_failure() {
        let server = MockServer::new();
        let result = run_command(&server, &config(), "false", 0).await.unwrap();
        assert_eq!(result.exit_status(), Some(1));
    }

    #[tokio::test]
    async fn preserve_status_keeps_command_status() {
        let server = MockServer::new();
        let config = config().trailing_wait(TrailingWait::PreserveStatus);
        let result = run_command(&server, &config, "frobnicate", 0).await.unwrap();
        assert_eq!(result.exit_status(), Some(127));
        assert_eq!(
            server.probe().snapshot().commands,
            vec!["frobnicate; __rc=$?; sleep 0; exit $__rc"]
        );
    }

    #[tokio::test]
    async fn exit_signal_is_reported() {
        let server = MockServer::new();
        let result = run_command(&server, &config(), "kill -9 $$", 0).await.unwrap();
        assert_eq!(result.exit_status(), None);
        assert_eq!(result.exit_signal(), Some("KILL"));
    }

    #[tokio::test]
    async fn late_exit_status_is_picked_up() {
        let server = MockServer::new().exec_reply(
            MockTimeline::new()
                .stdout("done\n")
                .then(crate::mock::MockEvent::Eof)
                .delay_ms(50)
                .then(crate::mock::MockEvent::ExitStatus(4))
                .then(crate::mock::MockEvent::Close),
        );
        let result = run_command(&server, &config(), "x", 0).await.unwrap();
        assert_eq!(result.exit_status(), Some(4));
        assert_eq!(result.stdout_lossy(), "done\n");
    }

    #[tokio::test]
    async fn silent_remote_degrades_to_partial_output() {
        let server = MockServer::new().exec_reply(MockTimeline::new().stdout("part").hang());
        let config = config().max_wait_for_output(Duration::from_millis(150));
        let started = Instant::now();
        let result = run_command(&server, &config, "x", 0).await.unwrap();
        assert_eq!(result.stdout_lossy(), "part");
        assert_eq!(result.exit_status(), None);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn exec_failure_is_execution_error_and_cleans_up() {
        let server = MockServer::new().fail_exec();
        let probe = server.probe();
        let err = run_command(&server, &config(), "echo hi", 0)
            .await
            .unwrap_err();
        assert!(err.is_execution());
        assert!(err.to_string().contains("Failed to execute command:[echo hi]"));
        let snapshot = probe.snapshot();
        assert_eq!(snapshot.session_closes, 1);
        assert_eq!(snapshot.connection_closes, 1);
    }

    #[tokio::test]
    async fn open_session_failure_closes_connection() {
        let server = MockServer::new().fail_open_session();
        let probe = server.probe();
        let err = run_command(&server, &config(), "echo hi", 0)
            .await
            .unwrap_err();
        assert!(err.is_execution());
        let snapshot = probe.snapshot();
        assert_eq!(snapshot.session_closes, 0);
        assert_eq!(snapshot.connection_closes, 1);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_connecting() {
        let server = MockServer::new();
        let err = run_command(&server, &SessionConfig::default(), "echo", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, SamplerError::Config { .. }));
        assert_eq!(server.probe().snapshot().connections, 0);
    }
}
