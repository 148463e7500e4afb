//! Keeps every configured stream consuming until shutdown.
//!
//! [`Supervisor::run`] gives each stream its own task. A task connects,
//! consumes, and on a dropped or refused connection waits out an exponential
//! backoff before trying again, forever. Only a non-retryable error or the
//! shutdown token ends a task, and either way the stream is closed first.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod backoff;
mod error;
mod event;
mod worker;

pub use backoff::{Backoff, BackoffPolicy};
pub use error::Error;
pub use event::{StopReason, WorkerEvent, WorkerOutcome, WorkerReport};

use alertstreams_stream::Stream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::worker::Worker;

const EVENT_CAPACITY: usize = 1024;

/// Runs one worker per stream.
#[derive(Debug)]
pub struct Supervisor {
    events: broadcast::Sender<WorkerEvent>,
    policy: BackoffPolicy,
    shutdown: CancellationToken,
    task_tracker: TaskTracker,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl Supervisor {
    /// Creates a supervisor using `policy` for every worker.
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            events: broadcast::channel(EVENT_CAPACITY).0,
            policy,
            shutdown: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Observes worker events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Token that stops every worker when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Requests cooperative shutdown of every worker.
    pub fn shutdown(&self) {
        info!("shutting down streams");
        self.shutdown.cancel();
    }

    /// Runs every stream until all workers have stopped.
    ///
    /// Under normal operation workers only stop on shutdown, so this returns
    /// once [`shutdown`](Self::shutdown) has been requested, or earlier if
    /// every stream hit a non-retryable error. Reports come back in the order
    /// the streams were given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] on a second call.
    pub async fn run(&self, streams: Vec<Stream>) -> Result<Vec<WorkerReport>, Error> {
        if self.task_tracker.is_closed() {
            return Err(Error::AlreadyStarted);
        }

        info!(streams = streams.len(), "starting stream workers");

        let mut handles = Vec::with_capacity(streams.len());
        for stream in streams {
            let stream_id = stream.id().to_string();
            let worker = Worker::new(
                stream,
                self.policy,
                self.shutdown.clone(),
                self.events.clone(),
            );
            handles.push((stream_id, self.task_tracker.spawn(worker.run())));
        }
        self.task_tracker.close();

        let mut reports = Vec::with_capacity(handles.len());
        for (stream_id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(stream_id = %stream_id, error = %e, "stream worker panicked");
                    WorkerOutcome::Panicked(e.to_string())
                }
            };
            reports.push(WorkerReport { stream_id, outcome });
        }
        self.task_tracker.wait().await;

        info!("all stream workers stopped");
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alertstreams_broker::{Broker, BrokerSession, Error as BrokerError, Result as BrokerResult};
    use alertstreams_stream::TopicRoutes;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct Unauthorized;

    #[async_trait]
    impl Broker for Unauthorized {
        async fn connect(&self, _topics: &[String]) -> BrokerResult<Box<dyn BrokerSession>> {
            Err(BrokerError::InvalidParam {
                key: "token".to_string(),
                reason: "not accepted".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_run_without_streams_returns_immediately() {
        let supervisor = Supervisor::default();

        let reports = supervisor.run(Vec::new()).await.unwrap();

        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn test_run_only_once() {
        let supervisor = Supervisor::default();
        supervisor.run(Vec::new()).await.unwrap();

        assert_matches!(supervisor.run(Vec::new()).await, Err(Error::AlreadyStarted));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_fatal_stream_is_reported_and_logged() {
        let mut routes = TopicRoutes::new();
        routes.bind("alerts", Vec::new()).unwrap();
        let stream = Stream::new("locked", "test", Box::new(Unauthorized), routes);
        let supervisor = Supervisor::default();
        let mut events = supervisor.subscribe();

        let reports = supervisor.run(vec![stream]).await.unwrap();

        assert_matches!(&reports[0].outcome, WorkerOutcome::Fatal(e) if !e.is_retryable());
        assert!(logs_contain("stream cannot run"));
        assert!(logs_contain("stream_id=locked"));
        assert!(logs_contain("locked"));

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert_matches!(
            last,
            Some(WorkerEvent::Stopped { reason: StopReason::Fatal(_), .. })
        );
    }

    #[test]
    fn test_shutdown_cancels_token() {
        let supervisor = Supervisor::default();
        let token = supervisor.shutdown_token();

        supervisor.shutdown();

        assert!(token.is_cancelled());
    }
}
