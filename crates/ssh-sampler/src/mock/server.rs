//! In-process fake SSH server.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use super::event::{MockEvent, MockTimeline};
use super::shell::FakeShell;
use crate::auth::AuthStrategy;
use crate::backend::{ChannelControl, ChannelEvent, Connection, Connector, EventSource};
use crate::config::{SessionConfig, TerminalConfig};
use crate::error::{Result, SamplerError};

/// Counters and records of everything the engine did to the fake server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSnapshot {
    /// Transport connects that succeeded.
    pub connections: usize,
    /// `Connection::close` calls.
    pub connection_closes: usize,
    /// Sessions opened.
    pub sessions_opened: usize,
    /// `ChannelControl::close` calls.
    pub session_closes: usize,
    /// `ChannelControl::close_stdin` calls.
    pub stdin_closes: usize,
    /// `EventSource::close` calls.
    pub stream_closes: usize,
    /// Description of every authentication strategy attempted.
    pub auth_attempts: Vec<String>,
    /// Every exec'd command line.
    pub commands: Vec<String>,
    /// Every pseudo-terminal request.
    pub pty_requests: Vec<TerminalConfig>,
    /// Shells started.
    pub shells_started: usize,
    /// All bytes written to standard input.
    pub written: Vec<u8>,
}

impl ProbeSnapshot {
    /// Standard input decoded as UTF-8 (lossy).
    #[must_use]
    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }
}

/// Shared view of a [`MockServer`]'s records.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    state: Arc<Mutex<ProbeSnapshot>>,
}

impl MockProbe {
    fn record(&self, f: impl FnOnce(&mut ProbeSnapshot)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }

    /// Copy of the current records.
    #[must_use]
    pub fn snapshot(&self) -> ProbeSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone, Default)]
struct Behavior {
    refuse_connection: bool,
    connect_delay: Option<Duration>,
    reject_auth: bool,
    fail_open_session: bool,
    fail_exec: bool,
    fail_writes: bool,
    fail_close: bool,
    exec_reply: Option<MockTimeline>,
    shell_banner: Option<MockTimeline>,
}

/// A fake SSH server the engine can connect to through [`Connector`].
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    behavior: Arc<Behavior>,
    probe: MockProbe,
}

impl MockServer {
    /// A server that accepts everything and runs commands in a fake shell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, f: impl FnOnce(&mut Behavior)) -> Self {
        f(Arc::make_mut(&mut self.behavior));
        self
    }

    /// Refuse the transport connect.
    #[must_use]
    pub fn refuse_connection(self) -> Self {
        self.with(|b| b.refuse_connection = true)
    }

    /// Delay the transport connect.
    #[must_use]
    pub fn connect_delay(self, delay: Duration) -> Self {
        self.with(|b| b.connect_delay = Some(delay))
    }

    /// Reject every authentication attempt.
    #[must_use]
    pub fn reject_auth(self) -> Self {
        self.with(|b| b.reject_auth = true)
    }

    /// Fail to open sessions.
    #[must_use]
    pub fn fail_open_session(self) -> Self {
        self.with(|b| b.fail_open_session = true)
    }

    /// Fail exec requests.
    #[must_use]
    pub fn fail_exec(self) -> Self {
        self.with(|b| b.fail_exec = true)
    }

    /// Fail every write to standard input.
    #[must_use]
    pub fn fail_writes(self) -> Self {
        self.with(|b| b.fail_writes = true)
    }

    /// Fail every close (the calls are still recorded).
    #[must_use]
    pub fn fail_close(self) -> Self {
        self.with(|b| b.fail_close = true)
    }

    /// Answer exec requests with a fixed timeline instead of the fake shell.
    #[must_use]
    pub fn exec_reply(self, timeline: MockTimeline) -> Self {
        self.with(|b| b.exec_reply = Some(timeline))
    }

    /// Play a timeline when a shell starts.
    #[must_use]
    pub fn shell_banner(self, timeline: MockTimeline) -> Self {
        self.with(|b| b.shell_banner = Some(timeline))
    }

    /// The probe recording what happens on this server.
    #[must_use]
    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl Connector for MockServer {
    type Connection = MockConnection;

    async fn connect(&self, config: &SessionConfig) -> Result<MockConnection> {
        if let Some(delay) = self.behavior.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.refuse_connection {
            return Err(SamplerError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("connection refused by {}", config.address()),
            )));
        }
        self.probe.record(|p| p.connections += 1);
        Ok(MockConnection {
            behavior: Arc::clone(&self.behavior),
            probe: self.probe.clone(),
        })
    }
}

/// A connection to a [`MockServer`].
#[derive(Debug)]
pub struct MockConnection {
    behavior: Arc<Behavior>,
    probe: MockProbe,
}

impl Connection for MockConnection {
    type Control = MockControl;
    type Source = MockSource;

    async fn authenticate(&mut self, _username: &str, strategy: &AuthStrategy) -> Result<bool> {
        self.probe
            .record(|p| p.auth_attempts.push(strategy.describe().to_string()));
        Ok(!self.behavior.reject_auth)
    }

    async fn open_session(&mut self) -> Result<(MockControl, MockSource)> {
        if self.behavior.fail_open_session {
            return Err(SamplerError::execution(
                "Failed to open SSH session",
                "channel open refused",
            ));
        }
        self.probe.record(|p| p.sessions_opened += 1);

        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(feed(feed_rx, event_tx));

        Ok((
            MockControl {
                behavior: Arc::clone(&self.behavior),
                probe: self.probe.clone(),
                feed: Some(feed_tx),
                shell: None,
                line: String::new(),
            },
            MockSource {
                events: event_rx,
                probe: self.probe.clone(),
            },
        ))
    }

    async fn close(&mut self) -> Result<()> {
        self.probe.record(|p| p.connection_closes += 1);
        if self.behavior.fail_close {
            return Err(SamplerError::Io(io::Error::other("connection close failed")));
        }
        Ok(())
    }
}

/// Input to the feeder task.
#[derive(Debug)]
enum Feed {
    Remote(MockEvent),
    ClientClose,
}

/// Plays remote-side events with their delays.
async fn feed(
    mut feed_rx: mpsc::UnboundedReceiver<Feed>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut hung = false;
    while let Some(item) = feed_rx.recv().await {
        let event = match item {
            Feed::ClientClose => MockEvent::Close,
            Feed::Remote(_) if hung => continue,
            Feed::Remote(MockEvent::Hang) => {
                hung = true;
                continue;
            }
            Feed::Remote(MockEvent::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                continue;
            }
            Feed::Remote(event) => event,
        };
        let closing = event == MockEvent::Close;
        if let Some(event) = event.into_channel_event() {
            if event_tx.send(event).is_err() {
                break;
            }
        }
        if closing {
            break;
        }
    }
}

/// Control half of a mock session.
#[derive(Debug)]
pub struct MockControl {
    behavior: Arc<Behavior>,
    probe: MockProbe,
    feed: Option<mpsc::UnboundedSender<Feed>>,
    shell: Option<FakeShell>,
    line: String,
}

impl MockControl {
    fn play(&mut self, events: impl IntoIterator<Item = MockEvent>) {
        if let Some(feed) = &self.feed {
            for event in events {
                let _ = feed.send(Feed::Remote(event));
            }
        }
    }

    fn closed_error(what: &str) -> SamplerError {
        SamplerError::Io(io::Error::new(
            io::ErrorKind::NotConnected,
            format!("{what} on closed channel"),
        ))
    }
}

impl ChannelControl for MockControl {
    async fn request_pty(&mut self, terminal: &TerminalConfig) -> Result<()> {
        let terminal = terminal.clone();
        self.probe.record(|p| p.pty_requests.push(terminal));
        Ok(())
    }

    async fn start_shell(&mut self) -> Result<()> {
        self.probe.record(|p| p.shells_started += 1);
        self.shell = Some(FakeShell::default());
        if let Some(banner) = self.behavior.shell_banner.clone() {
            self.play(banner.into_events());
        }
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<()> {
        if self.feed.is_none() {
            return Err(Self::closed_error("exec"));
        }
        self.probe.record(|p| p.commands.push(command.to_string()));
        if self.behavior.fail_exec {
            return Err(SamplerError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "exec request failed",
            )));
        }
        let events = match &self.behavior.exec_reply {
            Some(timeline) => timeline.clone().into_events(),
            None => FakeShell::default().run_exec(command),
        };
        self.play(events);
        Ok(())
    }

    async fn write_stdin(&mut self, data: &[u8]) -> Result<()> {
        if self.feed.is_none() {
            return Err(Self::closed_error("write"));
        }
        if self.behavior.fail_writes {
            return Err(SamplerError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        let data = data.to_vec();
        self.probe.record(|p| p.written.extend_from_slice(&data));

        let Some(shell) = self.shell.as_mut() else {
            return Ok(());
        };
        self.line.push_str(&String::from_utf8_lossy(&data));
        let mut events = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let line: String = self.line.drain(..=pos).collect();
            let outcome = shell.run_line(line.trim_end_matches(['\r', '\n']));
            events.extend(outcome.events);
            if outcome.terminated {
                self.shell = None;
                break;
            }
        }
        self.play(events);
        Ok(())
    }

    async fn close_stdin(&mut self) -> Result<()> {
        self.probe.record(|p| p.stdin_closes += 1);
        if let Some(shell) = self.shell.take() {
            self.play([
                MockEvent::Eof,
                MockEvent::ExitStatus(shell.status()),
                MockEvent::Close,
            ]);
        }
        if self.behavior.fail_close {
            return Err(SamplerError::Io(io::Error::other("stdin close failed")));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.probe.record(|p| p.session_closes += 1);
        if let Some(feed) = self.feed.take() {
            let _ = feed.send(Feed::ClientClose);
        }
        if self.behavior.fail_close {
            return Err(SamplerError::Io(io::Error::other("session close failed")));
        }
        Ok(())
    }
}

/// Read half of a mock session.
#[derive(Debug)]
pub struct MockSource {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    probe: MockProbe,
}

impl EventSource for MockSource {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    fn close(&mut self) {
        self.probe.record(|p| p.stream_closes += 1);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    async fn session(server: &MockServer) -> (MockControl, MockSource) {
        let mut connection = server.connect(&SessionConfig::new("mock")).await.unwrap();
        connection.open_session().await.unwrap()
    }

    #[tokio::test]
    async fn exec_runs_fake_shell() {
        let server = MockServer::new();
        let (mut control, mut source) = session(&server).await;
        control.exec("echo hi && sleep 0").await.unwrap();

        assert_eq!(
            source.next_event().await,
            Some(ChannelEvent::Stdout(Bytes::from_static(b"hi\n")))
        );
        assert_eq!(source.next_event().await, Some(ChannelEvent::Eof));
        assert_eq!(source.next_event().await, Some(ChannelEvent::ExitStatus(0)));
        assert_eq!(source.next_event().await, Some(ChannelEvent::Close));
        assert_eq!(source.next_event().await, None);
        assert_eq!(server.probe().snapshot().commands, vec!["echo hi && sleep 0"]);
    }

    #[tokio::test]
    async fn shell_answers_lines() {
        let server = MockServer::new();
        let (mut control, mut source) = session(&server).await;
        control.start_shell().await.unwrap();
        control.write_stdin(b"echo a\nexit\n").await.unwrap();

        assert_eq!(
            source.next_event().await,
            Some(ChannelEvent::Stdout(Bytes::from_static(b"a\n")))
        );
        assert_eq!(source.next_event().await, Some(ChannelEvent::Eof));
        assert_eq!(server.probe().snapshot().written_str(), "echo a\nexit\n");
    }

    #[tokio::test]
    async fn refused_connection_is_io_error() {
        let server = MockServer::new().refuse_connection();
        let err = server
            .connect(&SessionConfig::new("mock"))
            .await
            .unwrap_err();
        assert!(matches!(err, SamplerError::Io(_)));
    }

    #[tokio::test]
    async fn hang_swallows_everything_but_close() {
        let server = MockServer::new().exec_reply(MockTimeline::new().stdout("x").hang().exit(0));
        let (mut control, mut source) = session(&server).await;
        control.exec("anything").await.unwrap();
        assert_eq!(
            source.next_event().await,
            Some(ChannelEvent::Stdout(Bytes::from_static(b"x")))
        );
        control.close().await.unwrap();
        assert_eq!(source.next_event().await, Some(ChannelEvent::Close));
    }
}
