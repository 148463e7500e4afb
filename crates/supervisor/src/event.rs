use std::time::Duration;

use alertstreams_stream::{Error as StreamError, StreamState};

/// Progress of one worker, broadcast to observers.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    /// The stream moved to a new lifecycle state.
    StateChanged {
        /// Stream identifier.
        stream_id: String,
        /// New state.
        state: StreamState,
    },

    /// A retryable failure occurred; the worker will reconnect after `delay`.
    RetryScheduled {
        /// Stream identifier.
        stream_id: String,
        /// Retry number since the last backoff reset, starting at 1.
        attempt: u32,
        /// Wait before reconnecting.
        delay: Duration,
        /// The failure, rendered.
        error: String,
    },

    /// The worker has exited.
    Stopped {
        /// Stream identifier.
        stream_id: String,
        /// Why it exited.
        reason: StopReason,
    },
}

/// Why a worker exited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested.
    Cancelled,
    /// The stream's configuration can never work.
    Fatal(String),
}

/// Final result of one worker.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// Stopped on request.
    Cancelled,
    /// Stopped on a non-retryable error.
    Fatal(StreamError),
    /// The worker task panicked, most likely inside a handler.
    Panicked(String),
}

/// Final report for one stream.
#[derive(Debug)]
pub struct WorkerReport {
    /// Stream identifier.
    pub stream_id: String,
    /// How the worker ended.
    pub outcome: WorkerOutcome,
}

impl WorkerReport {
    /// Whether the worker ended on a fatal error or panic.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self.outcome, WorkerOutcome::Cancelled)
    }
}
