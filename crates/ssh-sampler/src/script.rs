//! Multi-line script execution over an interactive shell.
//!
//! A script is split on runs of `\r`/`\n`. Each line is, in order of
//! precedence:
//!
//! - blank (whitespace only): skipped
//! - starting with `#`: skipped
//! - starting with `wait `: the second space/tab separated field is a number
//!   of seconds to pause the feeding of input; skipped without pause when
//!   wait directives are disabled
//! - anything else: written to the shell followed by `\n`
//!
//! The prefixes are tested against the raw line, so an indented `# note` or
//! `  wait 3` is sent to the shell as a command.
//!
//! Standard error is not reported separately for scripts: with a
//! pseudo-terminal the remote shell interleaves both streams on standard
//! output.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::auth;
use crate::backend::{ChannelControl, Connector};
use crate::channel::ChannelStreams;
use crate::cleanup::ResourceScope;
use crate::config::SessionConfig;
use crate::drainer::OutputDrainer;
use crate::error::{Result, SamplerError};
use crate::executor::{finish, open_session, with_context};
use crate::types::ExecutionResult;

/// Comment marker.
pub const COMMENT_PREFIX: &str = "#";

/// Wait directive prefix (note the trailing space).
pub const WAIT_PREFIX: &str = "wait ";

static LINE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("line end pattern is a valid regex"));

static FIELD_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("field separator pattern is a valid regex"));

/// Why a line produced no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Empty or whitespace-only.
    Blank,
    /// Comment line.
    Comment,
    /// Wait directive while wait directives are disabled.
    WaitDisabled,
}

/// What one script line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Nothing.
    Skip(SkipReason),
    /// Pause input for a duration.
    Wait(Duration),
    /// Send a command line to the shell.
    Command(String),
}

impl ScriptStep {
    /// Classify one raw script line.
    pub fn parse(line: &str, wait_enabled: bool) -> Result<Self> {
        if line.trim().is_empty() {
            return Ok(Self::Skip(SkipReason::Blank));
        }
        if line.starts_with(COMMENT_PREFIX) {
            return Ok(Self::Skip(SkipReason::Comment));
        }
        if line.starts_with(WAIT_PREFIX) {
            if !wait_enabled {
                return Ok(Self::Skip(SkipReason::WaitDisabled));
            }
            let argument = FIELD_SEPARATOR
                .split(line)
                .nth(1)
                .filter(|arg| !arg.is_empty())
                .ok_or_else(|| SamplerError::script_parse(line, "missing wait time"))?;
            let secs: u64 = argument.parse().map_err(|e: std::num::ParseIntError| {
                SamplerError::script_parse(line, e.to_string())
            })?;
            return Ok(Self::Wait(Duration::from_secs(secs)));
        }
        Ok(Self::Command(line.to_string()))
    }

    /// Check if this step sends a command.
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(self, Self::Command(_))
    }
}

/// Split script text into raw lines.
pub fn script_lines(script: &str) -> impl Iterator<Item = &str> {
    LINE_END.split(script)
}

/// Classify every line of a script up front.
///
/// Execution parses lazily; this is for validating a script without a
/// connection.
pub fn parse_script(script: &str, wait_enabled: bool) -> Result<Vec<ScriptStep>> {
    script_lines(script)
        .map(|line| ScriptStep::parse(line, wait_enabled))
        .collect()
}

/// Run a script through an interactive shell on the remote host.
///
/// Lines are parsed as they are reached, so commands before a malformed wait
/// directive have already been sent when the error is returned. The result
/// carries no standard error.
pub async fn run_script<C: Connector>(
    connector: &C,
    config: &SessionConfig,
    script: &str,
    wait_enabled: bool,
    delay_after_each_command: Duration,
) -> Result<ExecutionResult> {
    config.validate()?;
    let mut scope = ResourceScope::new();
    let outcome = script_in_scope(
        connector,
        config,
        script,
        wait_enabled,
        delay_after_each_command,
        &mut scope,
    )
    .await;
    scope.release().await;
    outcome
}

async fn script_in_scope<C: Connector>(
    connector: &C,
    config: &SessionConfig,
    script: &str,
    wait_enabled: bool,
    delay_after_each_command: Duration,
    scope: &mut ResourceScope<C::Connection>,
) -> Result<ExecutionResult> {
    const PTY_CONTEXT: &str = "Failed to create SSH session with PTY";

    auth::establish(connector, config, scope).await?;

    let (control, source) = open_session(scope, PTY_CONTEXT).await?;
    scope.close_stdin_on_release();
    let control = scope.adopt_session(control);
    control
        .request_pty(&config.terminal)
        .await
        .map_err(|e| with_context(PTY_CONTEXT, e))?;
    control
        .start_shell()
        .await
        .map_err(|e| with_context(PTY_CONTEXT, e))?;

    let drainer = OutputDrainer::new(config.max_wait_for_output).spawn(ChannelStreams::new(source));
    tracing::info!("{}", config.describe());

    for line in script_lines(script) {
        match ScriptStep::parse(line, wait_enabled)? {
            ScriptStep::Skip(_) => {}
            ScriptStep::Wait(pause) => {
                let secs = pause.as_secs();
                tracing::info!(secs, "Waiting {secs}s before next command");
                tokio::time::sleep(pause).await;
            }
            ScriptStep::Command(command) => {
                let mut input = command.into_bytes();
                input.push(b'\n');
                control
                    .write_stdin(&input)
                    .await
                    .map_err(|e| with_context(format!("Failed to execute command:[{script}]"), e))?;
                tracing::info!(command = line, ">>command: {line}");

                if !delay_after_each_command.is_zero() {
                    tokio::time::sleep(delay_after_each_command).await;
                }
            }
        }
    }

    tracing::info!("Script execution completed");
    let report = drainer.join(config.max_wait_for_output).await?;
    Ok(finish(report, config.max_wait_for_output, false).await)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::mock::MockServer;

    #[test]
    fn classify_lines() {
        assert_eq!(
            ScriptStep::parse("   ", true).unwrap(),
            ScriptStep::Skip(SkipReason::Blank)
        );
        assert_eq!(
            ScriptStep::parse("# note", true).unwrap(),
            ScriptStep::Skip(SkipReason::Comment)
        );
        assert_eq!(
            ScriptStep::parse("wait 3", true).unwrap(),
            ScriptStep::Wait(Duration::from_secs(3))
        );
        assert_eq!(
            ScriptStep::parse("wait 3", false).unwrap(),
            ScriptStep::Skip(SkipReason::WaitDisabled)
        );
        assert_eq!(
            ScriptStep::parse("ls -l", true).unwrap(),
            ScriptStep::Command("ls -l".into())
        );
    }

    #[test]
    fn prefixes_match_raw_line_only() {
        assert!(ScriptStep::parse("  # indented", true).unwrap().is_command());
        assert!(ScriptStep::parse(" wait 3", true).unwrap().is_command());
        assert!(ScriptStep::parse("wait\t3", true).unwrap().is_command());
        assert!(ScriptStep::parse("waiting", true).unwrap().is_command());
    }

    #[test]
    fn wait_argument_is_second_field() {
        assert_eq!(
            ScriptStep::parse("wait  \t2 extra fields", true).unwrap(),
            ScriptStep::Wait(Duration::from_secs(2))
        );
    }

    #[test]
    fn malformed_wait_is_parse_error() {
        for line in ["wait abc", "wait ", "wait -1", "wait 1.5"] {
            let err = ScriptStep::parse(line, true).unwrap_err();
            assert!(err.is_script_parse(), "{line:?}");
            assert!(err.to_string().contains(line.trim_end()), "{line:?}");
        }
    }

    #[test]
    fn malformed_wait_is_ignored_when_disabled() {
        assert_eq!(
            ScriptStep::parse("wait abc", false).unwrap(),
            ScriptStep::Skip(SkipReason::WaitDisabled)
        );
    }

    #[test]
    fn script_lines_split_on_any_line_break_run() {
        let lines: Vec<_> = script_lines("a\r\nb\n\n\rc").collect();
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_script_collects_steps() {
        let steps = parse_script("# setup\ncd /tmp\nwait 1\n\nls", true).unwrap();
        let commands: Vec<_> = steps.iter().filter(|s| s.is_command()).collect();
        assert_eq!(commands.len(), 2);
        assert!(parse_script("ls\nwait x", true).is_err());
    }

    fn config() -> SessionConfig {
        SessionConfig::new("mock").max_wait_for_output(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn runs_script_through_shell() {
        let server = MockServer::new();
        let probe = server.probe();
        let script = "# hi\necho a\n\necho b\nexit";
        let result = run_script(&server, &config(), script, true, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(result.stdout_lossy(), "a\nb\n");
        assert_eq!(result.exit_status(), Some(0));
        assert!(result.stderr().is_none());

        let snapshot = probe.snapshot();
        assert_eq!(snapshot.written_str(), "echo a\necho b\nexit\n");
        assert_eq!(snapshot.pty_requests.len(), 1);
        assert_eq!(snapshot.pty_requests[0].term, "vt220");
        assert_eq!(snapshot.stdin_closes, 1);
        assert_eq!(snapshot.session_closes, 1);
        assert_eq!(snapshot.connection_closes, 1);
    }

    #[tokio::test]
    async fn commands_before_bad_wait_are_sent() {
        let server = MockServer::new();
        let probe = server.probe();
        let err = run_script(&server, &config(), "echo a\nwait abc\necho b", true, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.is_script_parse());
        let snapshot = probe.snapshot();
        assert_eq!(snapshot.written_str(), "echo a\n");
        assert_eq!(snapshot.connection_closes, 1);
    }

    #[tokio::test]
    async fn write_failure_is_execution_error() {
        let server = MockServer::new().fail_writes();
        let probe = server.probe();
        let err = run_script(&server, &config(), "echo a", true, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.is_execution());
        let snapshot = probe.snapshot();
        assert_eq!(snapshot.stdin_closes, 1);
        assert_eq!(snapshot.session_closes, 1);
        assert_eq!(snapshot.connection_closes, 1);
    }

    #[tokio::test]
    async fn empty_script_returns_empty_output() {
        let server = MockServer::new();
        let started = Instant::now();
        let result = run_script(&server, &config(), "", true, Duration::ZERO)
            .await
            .unwrap();
        assert!(result.stdout().is_empty());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn delay_after_each_command_paces_input() {
        let server = MockServer::new();
        let started = Instant::now();
        run_script(
            &server,
            &config(),
            "echo a\necho b\nexit",
            true,
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }
}
