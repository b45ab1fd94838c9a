//! Integration tests for command and script execution against the mock
//! backend.
//!
//! These tests require the `mock` feature to be enabled.

#![cfg(feature = "mock")]

use std::time::{Duration, Instant};

use ssh_sampler::mock::{MockEvent, MockServer, MockTimeline};
use ssh_sampler::{CommandSampler, ScriptSampler, SessionConfig, SshClient, run_command, run_script};

fn config() -> SessionConfig {
    SessionConfig::new("load01")
        .username("bench")
        .max_wait_for_output(Duration::from_secs(2))
}

#[tokio::test]
async fn command_echo_hi() {
    let sample = CommandSampler::new(config())
        .command("echo hi")
        .wait_secs(0)
        .sample_with(&MockServer::new())
        .await;

    assert!(sample.success);
    assert_eq!(sample.response_code, "0");
    assert_eq!(sample.response_data_str(), "hi\n");
    assert_eq!(sample.response_message, "ExitSignal:[null], StdErr:[]");
}

#[tokio::test]
async fn script_wait_directive_pauses_input() {
    let server = MockServer::new();
    let started = Instant::now();
    let result = run_script(&server, &config(), "echo a\nwait 1\necho b", true, Duration::ZERO)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    let stdout = result.stdout_lossy();
    let a = stdout.find('a').unwrap();
    let b = stdout.find('b').unwrap();
    assert!(a < b);
    assert_eq!(server.probe().snapshot().written_str(), "echo a\necho b\n");
}

#[tokio::test]
async fn unreachable_host_is_failed_sample() {
    let server = MockServer::new().refuse_connection();
    let probe = server.probe();
    let sample = CommandSampler::new(config())
        .command("echo hi")
        .sample_with(&server)
        .await;

    assert!(!sample.success);
    assert_eq!(sample.response_code, "-1");
    assert!(sample.response_message.starts_with("Exception: "));
    let snapshot = probe.snapshot();
    assert_eq!(snapshot.connections, 0);
    assert_eq!(snapshot.connection_closes, 0);
}

#[tokio::test]
async fn password_takes_precedence_over_key_file() {
    let server = MockServer::new();
    let probe = server.probe();
    let config = config().password("secret").key_file("/home/bench/.ssh/id_ed25519");
    run_command(&server, &config, "true", 0).await.unwrap();

    assert_eq!(probe.snapshot().auth_attempts, vec!["authentication with password"]);
}

#[tokio::test]
async fn rejected_login_closes_connection_once() {
    let server = MockServer::new().reject_auth();
    let probe = server.probe();
    let err = run_command(&server, &config(), "true", 0).await.unwrap_err();

    assert!(err.is_connection());
    assert!(err.to_string().contains("authentication with none"));
    let snapshot = probe.snapshot();
    assert_eq!(snapshot.connections, 1);
    assert_eq!(snapshot.sessions_opened, 0);
    assert_eq!(snapshot.connection_closes, 1);
}

#[tokio::test]
async fn connect_timeout_is_connection_error() {
    let server = MockServer::new().connect_delay(Duration::from_secs(5));
    let config = config().connection_timeout(Duration::from_millis(100));
    let started = Instant::now();
    let err = run_command(&server, &config, "true", 0).await.unwrap_err();

    assert!(err.is_connection());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn cleanup_runs_exactly_once_on_success() {
    let server = MockServer::new();
    let probe = server.probe();
    run_command(&server, &config(), "echo hi", 0).await.unwrap();

    let snapshot = probe.snapshot();
    assert_eq!(snapshot.sessions_opened, 1);
    assert_eq!(snapshot.session_closes, 1);
    assert_eq!(snapshot.connection_closes, 1);
    assert_eq!(snapshot.stream_closes, 1);
}

#[tokio::test]
async fn cleanup_runs_exactly_once_on_io_failure() {
    let server = MockServer::new().fail_writes();
    let probe = server.probe();
    let sample = ScriptSampler::new(config())
        .script("echo a")
        .sample_with(&server)
        .await;

    assert!(!sample.success);
    let snapshot = probe.snapshot();
    assert_eq!(snapshot.session_closes, 1);
    assert_eq!(snapshot.connection_closes, 1);
}

#[tokio::test]
async fn cleanup_runs_once_after_output_timeout() {
    let server = MockServer::new().exec_reply(MockTimeline::new().stdout("partial").hang());
    let probe = server.probe();
    let config = config().max_wait_for_output(Duration::from_millis(200));
    let result = run_command(&server, &config, "tail -f /var/log/syslog", 0)
        .await
        .unwrap();

    assert_eq!(result.stdout_lossy(), "partial");
    assert_eq!(result.exit_status(), None);
    let snapshot = probe.snapshot();
    assert_eq!(snapshot.session_closes, 1);
    assert_eq!(snapshot.connection_closes, 1);
}

#[tokio::test]
async fn silent_remote_never_hangs() {
    let server = MockServer::new().exec_reply(MockTimeline::new().hang());
    let config = config().max_wait_for_output(Duration::from_millis(300));
    let started = Instant::now();
    let sample = CommandSampler::new(config)
        .command("cat")
        .sample_with(&server)
        .await;

    assert!(sample.success);
    assert_eq!(sample.response_code, "null");
    assert!(sample.response_data.is_empty());
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn close_failure_does_not_change_outcome() {
    let server = MockServer::new().fail_close();
    let result = run_command(&server, &config(), "echo hi", 0).await.unwrap();
    assert_eq!(result.stdout_lossy(), "hi\n");
}

#[tokio::test]
async fn killed_command_reports_signal() {
    let server = MockServer::new().exec_reply(MockTimeline::new().stdout("x").killed("TERM"));
    let sample = CommandSampler::new(config())
        .command("long-job")
        .sample_with(&server)
        .await;

    assert!(sample.success);
    assert_eq!(sample.response_code, "null");
    assert_eq!(sample.response_message, "ExitSignal:[TERM], StdErr:[]");
}

#[tokio::test]
async fn stderr_and_stdout_are_kept_apart() {
    let server = MockServer::new().exec_reply(
        MockTimeline::new()
            .stdout("out")
            .then(MockEvent::stderr("warn: disk 91%"))
            .exit(0),
    );
    let sample = CommandSampler::new(config())
        .command("df")
        .sample_with(&server)
        .await;

    assert_eq!(sample.response_data_str(), "out");
    assert_eq!(sample.response_message, "ExitSignal:[null], StdErr:[warn: disk 91%]");
}

#[tokio::test]
async fn script_pty_uses_configured_terminal() {
    let server = MockServer::new();
    let probe = server.probe();
    let config = config().terminal(ssh_sampler::TerminalConfig::new("xterm", 132, 43));
    let client = SshClient::with_connector(server, config);
    client
        .execute_script("echo a\nexit", true, Duration::ZERO)
        .await
        .unwrap();

    let snapshot = probe.snapshot();
    assert_eq!(snapshot.shells_started, 1);
    assert_eq!(snapshot.pty_requests[0].term, "xterm");
    assert_eq!(snapshot.pty_requests[0].dimensions.cols, 132);
    assert_eq!(snapshot.pty_requests[0].dimensions.rows, 43);
}

#[tokio::test]
async fn script_parse_error_is_failed_sample() {
    let sample = ScriptSampler::new(config())
        .script("echo a\nwait soon")
        .sample_with(&MockServer::new())
        .await;

    assert!(!sample.success);
    assert_eq!(sample.response_code, "-1");
    assert!(sample.response_message.contains("wait soon"));
    assert_eq!(sample.sampler_data, "echo a\nwait soon");
}

#[tokio::test]
async fn disabled_wait_directive_is_skipped() {
    let script = "echo a\nwait 1\nexit";

    let enabled = Instant::now();
    run_script(&MockServer::new(), &config(), script, true, Duration::ZERO)
        .await
        .unwrap();
    let enabled = enabled.elapsed();

    let server = MockServer::new();
    let disabled = Instant::now();
    run_script(&server, &config(), script, false, Duration::ZERO)
        .await
        .unwrap();
    let disabled = disabled.elapsed();

    assert!(enabled >= Duration::from_secs(1));
    assert!(disabled < enabled);
    assert_eq!(server.probe().snapshot().written_str(), "echo a\nexit\n");
}

#[tokio::test]
async fn unbounded_output_wait_returns_output() {
    let config = config().max_wait_for_output(Duration::MAX);
    let result = run_command(&MockServer::new(), &config, "echo hi", 0)
        .await
        .unwrap();

    assert_eq!(result.stdout_lossy(), "hi\n");
    assert_eq!(result.exit_status(), Some(0));
}

#[tokio::test]
async fn cancelled_command_still_closes_once() {
    let server = MockServer::new().exec_reply(MockTimeline::new().stdout("x").hang());
    let probe = server.probe();
    let config = config().max_wait_for_output(Duration::from_secs(5));

    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        run_command(&server, &config, "x", 0),
    )
    .await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = probe.snapshot();
    assert_eq!(snapshot.session_closes, 1);
    assert_eq!(snapshot.connection_closes, 1);
}

#[tokio::test]
async fn cancelled_script_still_closes_once() {
    let server = MockServer::new();
    let probe = server.probe();

    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        run_script(&server, &config(), "echo a\nwait 5\nexit", true, Duration::ZERO),
    )
    .await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = probe.snapshot();
    assert_eq!(snapshot.stdin_closes, 1);
    assert_eq!(snapshot.session_closes, 1);
    assert_eq!(snapshot.connection_closes, 1);
}
