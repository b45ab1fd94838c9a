//! Background output drainer.
//!
//! One drainer task runs per execution call. It owns the read half of the
//! session and the output buffers; the executor gets both back only through
//! [`DrainerHandle::join`], which is the single synchronization point between
//! the two.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::backend::EventSource;
use crate::channel::{ChannelStreams, Readiness};
use crate::error::{Result, SamplerError};

/// How long a drainer gets to wind down after being told to stop.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Accumulated output of one execution.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    stdout: BytesMut,
    stderr: BytesMut,
}

impl OutputBuffer {
    /// Standard output collected so far.
    #[must_use]
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Standard error collected so far.
    #[must_use]
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// One drain pass: all buffered standard output, then all standard error.
    fn drain_from<S: EventSource>(&mut self, streams: &mut ChannelStreams<S>) {
        streams.read_stdout(&mut self.stdout);
        streams.read_stderr(&mut self.stderr);
    }

    /// Freeze both buffers. Empty buffers stay empty, never absent.
    #[must_use]
    pub fn freeze(self) -> (Bytes, Bytes) {
        (self.stdout.freeze(), self.stderr.freeze())
    }
}

/// Why the drainer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The remote side signalled end-of-stream.
    EndOfStream,
    /// No data arrived within the bound.
    Timeout,
    /// The readiness wait returned an empty condition.
    Unexpected,
    /// The executor told the drainer to stop.
    Cancelled,
}

/// What the drainer hands back to the executor.
#[derive(Debug)]
pub struct DrainReport<S> {
    /// Collected output.
    pub output: OutputBuffer,
    /// The channel state, for exit status and signal.
    pub streams: ChannelStreams<S>,
    /// Why draining ended.
    pub stop: StopReason,
}

/// Spawns drainer tasks.
#[derive(Debug, Clone, Copy)]
pub struct OutputDrainer {
    max_wait: Duration,
}

impl OutputDrainer {
    /// A drainer whose readiness waits are bounded by `max_wait`.
    #[must_use]
    pub const fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }

    /// Start draining `streams` on its own task.
    pub fn spawn<S: EventSource>(self, streams: ChannelStreams<S>) -> DrainerHandle<S> {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(streams, stop_rx));
        DrainerHandle {
            task,
            stop: Some(stop_tx),
        }
    }

    async fn run<S: EventSource>(
        self,
        mut streams: ChannelStreams<S>,
        mut stop_rx: oneshot::Receiver<()>,
    ) -> DrainReport<S> {
        let mut output = OutputBuffer::default();
        let stop = loop {
            let readiness = tokio::select! {
                biased;
                _ = &mut stop_rx => break StopReason::Cancelled,
                readiness = streams.await_data(self.max_wait) => readiness,
            };
            match readiness {
                Readiness::DataAvailable => output.drain_from(&mut streams),
                Readiness::EndOfStream => break StopReason::EndOfStream,
                Readiness::Timeout => break StopReason::Timeout,
                Readiness::Unexpected => break StopReason::Unexpected,
            }
        };

        streams.pump_ready().await;
        output.drain_from(&mut streams);
        streams.close_streams();

        tracing::debug!(
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            ?stop,
            "Output drainer stopped"
        );
        DrainReport {
            output,
            streams,
            stop,
        }
    }
}

/// Handle to a running drainer.
///
/// Dropping the handle tells the drainer to stop.
#[derive(Debug)]
pub struct DrainerHandle<S> {
    task: JoinHandle<DrainReport<S>>,
    stop: Option<oneshot::Sender<()>>,
}

impl<S: EventSource> DrainerHandle<S> {
    /// Wait for the drainer to finish, at most `bound`.
    ///
    /// If the bound elapses the drainer is told to stop and its partial
    /// output is returned; only a drainer that will not stop at all is an
    /// error.
    pub async fn join(mut self, bound: Duration) -> Result<DrainReport<S>> {
        match timeout(bound, &mut self.task).await {
            Ok(joined) => return joined.map_err(Self::join_error),
            Err(_) => {
                tracing::warn!(
                    bound_ms = bound.as_millis() as u64,
                    "Output drainer still running after wait bound, stopping it"
                );
            }
        }

        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match timeout(STOP_GRACE, &mut self.task).await {
            Ok(joined) => joined.map_err(Self::join_error),
            Err(_) => {
                self.task.abort();
                Err(SamplerError::execution(
                    "Output drainer did not stop",
                    format!("still running {STOP_GRACE:?} after stop request"),
                ))
            }
        }
    }

    fn join_error(err: tokio::task::JoinError) -> SamplerError {
        SamplerError::execution("Output drainer failed", err.to_string())
    }
}
