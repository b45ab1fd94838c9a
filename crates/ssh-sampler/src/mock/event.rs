//! Scripted remote-side events for the mock backend.

use std::time::Duration;

use bytes::Bytes;

use crate::backend::ChannelEvent;

/// Something the fake remote side does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// Write to standard output.
    Stdout(Vec<u8>),
    /// Write to standard error.
    Stderr(Vec<u8>),
    /// Pause before the next event.
    Delay(Duration),
    /// Report an exit status.
    ExitStatus(u32),
    /// Report an exit signal.
    ExitSignal(String),
    /// Send end-of-stream.
    Eof,
    /// Close the channel.
    Close,
    /// Stop responding. Only a client-side close gets through afterwards.
    Hang,
}

impl MockEvent {
    /// Standard output from a string.
    #[must_use]
    pub fn stdout(s: &str) -> Self {
        Self::Stdout(s.as_bytes().to_vec())
    }

    /// Standard error from a string.
    #[must_use]
    pub fn stderr(s: &str) -> Self {
        Self::Stderr(s.as_bytes().to_vec())
    }

    /// Delay in milliseconds.
    #[must_use]
    pub const fn delay_ms(ms: u64) -> Self {
        Self::Delay(Duration::from_millis(ms))
    }

    /// The channel event this turns into, if any.
    pub(crate) fn into_channel_event(self) -> Option<ChannelEvent> {
        match self {
            Self::Stdout(data) => Some(ChannelEvent::Stdout(Bytes::from(data))),
            Self::Stderr(data) => Some(ChannelEvent::Stderr(Bytes::from(data))),
            Self::ExitStatus(status) => Some(ChannelEvent::ExitStatus(status)),
            Self::ExitSignal(signal) => Some(ChannelEvent::ExitSignal(signal)),
            Self::Eof => Some(ChannelEvent::Eof),
            Self::Close => Some(ChannelEvent::Close),
            Self::Delay(_) | Self::Hang => None,
        }
    }
}

/// An ordered list of remote-side events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockTimeline {
    events: Vec<MockEvent>,
}

impl MockTimeline {
    /// Create an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    #[must_use]
    pub fn then(mut self, event: MockEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Append standard output.
    #[must_use]
    pub fn stdout(self, s: &str) -> Self {
        self.then(MockEvent::stdout(s))
    }

    /// Append standard error.
    #[must_use]
    pub fn stderr(self, s: &str) -> Self {
        self.then(MockEvent::stderr(s))
    }

    /// Append a delay.
    #[must_use]
    pub fn delay_ms(self, ms: u64) -> Self {
        self.then(MockEvent::delay_ms(ms))
    }

    /// Append end-of-stream, an exit status, and close, in the order a
    /// typical server sends them.
    #[must_use]
    pub fn exit(self, status: u32) -> Self {
        self.then(MockEvent::Eof)
            .then(MockEvent::ExitStatus(status))
            .then(MockEvent::Close)
    }

    /// Append an exit signal followed by end-of-stream and close.
    #[must_use]
    pub fn killed(self, signal: &str) -> Self {
        self.then(MockEvent::ExitSignal(signal.to_string()))
            .then(MockEvent::Eof)
            .then(MockEvent::Close)
    }

    /// Stop responding.
    #[must_use]
    pub fn hang(self) -> Self {
        self.then(MockEvent::Hang)
    }

    /// The events in order.
    #[must_use]
    pub fn events(&self) -> &[MockEvent] {
        &self.events
    }

    /// Take the events.
    #[must_use]
    pub fn into_events(self) -> Vec<MockEvent> {
        self.events
    }
}
