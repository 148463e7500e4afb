use alertstreams_stream::{Stream, StreamState};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{Backoff, BackoffPolicy, StopReason, WorkerEvent, WorkerOutcome};

pub struct Worker {
    backoff: Backoff,
    events: broadcast::Sender<WorkerEvent>,
    reported: Option<StreamState>,
    shutdown: CancellationToken,
    stream: Stream,
    stream_id: String,
}

impl Worker {
    pub fn new(
        stream: Stream,
        policy: BackoffPolicy,
        shutdown: CancellationToken,
        events: broadcast::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            backoff: Backoff::new(policy),
            events,
            reported: None,
            shutdown,
            stream_id: stream.id().to_string(),
            stream,
        }
    }

    pub async fn run(mut self) -> WorkerOutcome {
        self.report(self.stream.state());

        let outcome = self.supervise().await;

        self.stream.close().await;
        self.report(StreamState::Stopped);

        let reason = match &outcome {
            WorkerOutcome::Fatal(e) => StopReason::Fatal(e.to_string()),
            _ => StopReason::Cancelled,
        };
        info!(stream_id = %self.stream_id, ?reason, "stream worker stopped");
        self.emit(WorkerEvent::Stopped {
            stream_id: self.stream_id.clone(),
            reason,
        });

        outcome
    }

    async fn supervise(&mut self) -> WorkerOutcome {
        loop {
            let connected = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return WorkerOutcome::Cancelled,
                connected = self.stream.connect() => connected,
            };
            self.report(self.stream.state());

            let error = match connected {
                Ok(()) => {
                    self.report(StreamState::Consuming);
                    let started = Instant::now();
                    match self.stream.consume_forever(&self.shutdown).await {
                        Ok(()) => return WorkerOutcome::Cancelled,
                        Err(e) => {
                            self.backoff.record_consumption(started.elapsed());
                            e
                        }
                    }
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                error!(stream_id = %self.stream_id, error = %error, "stream cannot run");
                return WorkerOutcome::Fatal(error);
            }

            let delay = self.backoff.next_delay();
            let attempt = self.backoff.attempt();
            warn!(
                stream_id = %self.stream_id,
                attempt,
                delay = ?delay,
                error = %error,
                "stream connection failed, reconnecting"
            );
            self.emit(WorkerEvent::RetryScheduled {
                stream_id: self.stream_id.clone(),
                attempt,
                delay,
                error: error.to_string(),
            });

            self.stream.begin_reconnect().await;
            self.report(self.stream.state());

            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return WorkerOutcome::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn report(&mut self, state: StreamState) {
        if self.reported != Some(state) {
            self.reported = Some(state);
            self.emit(WorkerEvent::StateChanged {
                stream_id: self.stream_id.clone(),
                state,
            });
        }
    }

    fn emit(&self, event: WorkerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
