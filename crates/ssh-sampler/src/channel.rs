//! Channel state tracking and the readiness wait.
//!
//! [`ChannelStreams`] folds the event stream of a session channel into local
//! buffers and a [`ChannelCondition`] mask, so the output drainer can block on
//! "something happened" with a timeout and then read whatever has arrived
//! without blocking.

use std::time::Duration;

use bitflags::bitflags;
use bytes::BytesMut;
use tokio::time::{Instant, timeout, timeout_at};

use crate::backend::{ChannelEvent, EventSource};

/// Upper bound on events taken by one non-blocking pump.
const PUMP_LIMIT: usize = 1024;

/// Stand-in deadline for limits too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `limit` from now, saturating at a far-future deadline.
fn deadline_after(limit: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(limit).unwrap_or_else(|| now + FAR_FUTURE)
}

bitflags! {
    /// Conditions that can hold on a session channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelCondition: u32 {
        /// The wait timed out.
        const TIMEOUT = 1;
        /// The channel is closed.
        const CLOSED = 1 << 1;
        /// Standard output has unread data.
        const STDOUT_DATA = 1 << 2;
        /// Standard error has unread data.
        const STDERR_DATA = 1 << 3;
        /// The remote side will send no more data.
        const EOF = 1 << 4;
        /// The exit status is known.
        const EXIT_STATUS = 1 << 5;
        /// The exit signal is known.
        const EXIT_SIGNAL = 1 << 6;
    }
}

/// Result of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// At least one output stream has unread data.
    DataAvailable,
    /// The remote side will send no more data.
    EndOfStream,
    /// Nothing arrived within the bound.
    Timeout,
    /// The wait returned without timeout, end-of-stream, or data.
    Unexpected,
}

impl Readiness {
    /// Resolve a condition mask: timeout first, then end-of-stream (closed
    /// implies it), then data.
    #[must_use]
    pub const fn resolve(mask: ChannelCondition) -> Self {
        if mask.contains(ChannelCondition::TIMEOUT) {
            Self::Timeout
        } else if mask.intersects(ChannelCondition::EOF.union(ChannelCondition::CLOSED)) {
            Self::EndOfStream
        } else if !mask
            .intersects(ChannelCondition::STDOUT_DATA.union(ChannelCondition::STDERR_DATA))
        {
            Self::Unexpected
        } else {
            Self::DataAvailable
        }
    }
}

/// Buffered view of a session channel's read side.
#[derive(Debug)]
pub struct ChannelStreams<S> {
    source: S,
    stdout: BytesMut,
    stderr: BytesMut,
    streams_closed: bool,
    eof: bool,
    closed: bool,
    exit_status: Option<u32>,
    exit_signal: Option<String>,
}

impl<S: EventSource> ChannelStreams<S> {
    /// Wrap an event source.
    pub fn new(source: S) -> Self {
        Self {
            source,
            stdout: BytesMut::new(),
            stderr: BytesMut::new(),
            streams_closed: false,
            eof: false,
            closed: false,
            exit_status: None,
            exit_signal: None,
        }
    }

    fn apply(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Stdout(_) | ChannelEvent::Stderr(_)) if self.streams_closed => {}
            Some(ChannelEvent::Stdout(data)) => self.stdout.extend_from_slice(&data),
            Some(ChannelEvent::Stderr(data)) => self.stderr.extend_from_slice(&data),
            Some(ChannelEvent::Eof) => self.eof = true,
            Some(ChannelEvent::ExitStatus(status)) => self.exit_status = Some(status),
            Some(ChannelEvent::ExitSignal(signal)) => self.exit_signal = Some(signal),
            Some(ChannelEvent::Close) | None => {
                self.eof = true;
                self.closed = true;
            }
        }
    }

    /// Conditions currently holding, without waiting.
    #[must_use]
    pub fn conditions(&self) -> ChannelCondition {
        let mut mask = ChannelCondition::empty();
        mask.set(ChannelCondition::STDOUT_DATA, !self.stdout.is_empty());
        mask.set(ChannelCondition::STDERR_DATA, !self.stderr.is_empty());
        mask.set(ChannelCondition::EOF, self.eof);
        mask.set(ChannelCondition::CLOSED, self.closed);
        mask.set(ChannelCondition::EXIT_STATUS, self.exit_status.is_some());
        mask.set(ChannelCondition::EXIT_SIGNAL, self.exit_signal.is_some());
        mask
    }

    /// Block until any of `wanted` holds or `limit` elapses.
    ///
    /// Returns the full condition mask, with `TIMEOUT` set if the limit was
    /// reached first.
    pub async fn wait_for_condition(
        &mut self,
        wanted: ChannelCondition,
        limit: Duration,
    ) -> ChannelCondition {
        let deadline = deadline_after(limit);
        loop {
            let current = self.conditions();
            if current.intersects(wanted) {
                return current;
            }
            if self.closed {
                return current;
            }
            match timeout_at(deadline, self.source.next_event()).await {
                Ok(event) => self.apply(event),
                Err(_) => return self.conditions() | ChannelCondition::TIMEOUT,
            }
        }
    }

    /// The readiness wait used by the output drainer.
    pub async fn await_data(&mut self, limit: Duration) -> Readiness {
        let mask = self
            .wait_for_condition(
                ChannelCondition::STDOUT_DATA
                    | ChannelCondition::STDERR_DATA
                    | ChannelCondition::EOF,
                limit,
            )
            .await;
        let readiness = Readiness::resolve(mask);
        match readiness {
            Readiness::Timeout => tracing::debug!("WaitForCondition: waiting timeout"),
            Readiness::EndOfStream => tracing::debug!("WaitForCondition: EOF reached"),
            Readiness::Unexpected => tracing::debug!("WaitForCondition: unexpected condition"),
            Readiness::DataAvailable => {}
        }
        readiness
    }

    /// Take every event that has already arrived, without waiting.
    pub async fn pump_ready(&mut self) {
        for _ in 0..PUMP_LIMIT {
            if self.closed {
                return;
            }
            match timeout(Duration::ZERO, self.source.next_event()).await {
                Ok(event) => self.apply(event),
                Err(_) => return,
            }
        }
    }

    /// Move all currently buffered standard output into `buf`.
    pub fn read_stdout(&mut self, buf: &mut BytesMut) -> usize {
        let n = self.stdout.len();
        buf.extend_from_slice(&self.stdout.split());
        n
    }

    /// Move all currently buffered standard error into `buf`.
    pub fn read_stderr(&mut self, buf: &mut BytesMut) -> usize {
        let n = self.stderr.len();
        buf.extend_from_slice(&self.stderr.split());
        n
    }

    /// Keep consuming events until the exit status or signal is known, the
    /// channel closes, or `limit` elapses.
    pub async fn wait_for_exit(&mut self, limit: Duration) {
        self.wait_for_condition(
            ChannelCondition::EXIT_STATUS
                | ChannelCondition::EXIT_SIGNAL
                | ChannelCondition::CLOSED,
            limit,
        )
        .await;
    }

    /// Exit status, if reported.
    #[must_use]
    pub const fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    /// Exit signal, if reported.
    #[must_use]
    pub fn exit_signal(&self) -> Option<&str> {
        self.exit_signal.as_deref()
    }

    /// Whether end-of-stream has been seen.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.eof
    }

    /// Close standard output and standard error. Later data is discarded;
    /// exit status, signal and close are still tracked.
    pub fn close_streams(&mut self) {
        if !self.streams_closed {
            self.streams_closed = true;
            self.stdout.clear();
            self.stderr.clear();
            self.source.close();
        }
    }

    /// Take the exit metadata, leaving the source behind.
    pub fn into_exit(self) -> (Option<u32>, Option<String>) {
        (self.exit_status, self.exit_signal)
    }
}
