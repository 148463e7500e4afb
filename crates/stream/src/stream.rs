use std::fmt::{self, Debug, Display};

use alertstreams_broker::{Broker, BrokerSession, Error as BrokerError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Error, TopicRoutes};

/// Lifecycle of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Built but never connected.
    Uninitialized,
    /// First connection attempt in progress.
    Connecting,
    /// Session established, not yet consuming.
    Connected,
    /// Receiving and dispatching messages.
    Consuming,
    /// Connection lost; waiting to reconnect.
    Reconnecting,
    /// Closed for good.
    Stopped,
}

impl Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Consuming => "consuming",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        })
    }
}

/// One configured connection to a broker and the topics it routes.
///
/// A stream owns at most one live session at a time and is driven by exactly
/// one worker.
pub struct Stream {
    broker: Box<dyn Broker>,
    id: String,
    kind: String,
    routes: TopicRoutes,
    session: Option<Box<dyn BrokerSession>>,
    state: watch::Sender<StreamState>,
}

impl Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("broker", &self.broker)
            .field("topics", &self.routes.topics())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Stream {
    /// Creates an unconnected stream.
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        broker: Box<dyn Broker>,
        routes: TopicRoutes,
    ) -> Self {
        Self {
            broker,
            id: id.into(),
            kind: kind.into(),
            routes,
            session: None,
            state: watch::channel(StreamState::Uninitialized).0,
        }
    }

    /// Stream identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Broker kind tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Topic routing table.
    #[must_use]
    pub const fn routes(&self) -> &TopicRoutes {
        &self.routes
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Observes lifecycle changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: StreamState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(stream_id = %self.id, from = %previous, to = %state, "stream state changed");
        }
    }

    /// Opens a session subscribed to every bound topic.
    ///
    /// Any previous session is closed first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] once the stream has been closed,
    /// [`Error::Connection`] for failures worth retrying and
    /// [`Error::Configuration`] for ones that are not.
    pub async fn connect(&mut self) -> Result<(), Error> {
        match self.state() {
            StreamState::Stopped => return Err(Error::Stopped(self.id.clone())),
            StreamState::Uninitialized => self.set_state(StreamState::Connecting),
            _ => {}
        }

        self.close_session().await;

        let session = self
            .broker
            .connect(self.routes.topics())
            .await
            .map_err(|e| Error::from_broker(&self.id, e))?;
        self.session = Some(session);

        if self.state() == StreamState::Connecting {
            self.set_state(StreamState::Connected);
        }
        info!(stream_id = %self.id, kind = %self.kind, topics = ?self.routes.topics(), "stream connected");

        Ok(())
    }

    /// Receives and dispatches messages until `shutdown` is cancelled or the
    /// session fails.
    ///
    /// Cancellation is observed before each receive and while waiting for a
    /// message. The broker's end-of-stream signal is reported as a dropped
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without a session, otherwise the
    /// classified broker failure that ended consumption.
    pub async fn consume_forever(&mut self, shutdown: &CancellationToken) -> Result<(), Error> {
        if self.session.is_none() {
            return Err(Error::NotConnected(self.id.clone()));
        }
        self.set_state(StreamState::Consuming);

        let Some(session) = self.session.as_mut() else {
            return Err(Error::NotConnected(self.id.clone()));
        };

        loop {
            let received = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debug!(stream_id = %self.id, "consumption cancelled");
                    return Ok(());
                }
                received = session.receive() => received,
            };

            let message = match received {
                Ok(Some(message)) => message,
                Ok(None) => {
                    return Err(Error::from_broker(
                        &self.id,
                        BrokerError::connection("broker ended the stream"),
                    ));
                }
                Err(e) => return Err(Error::from_broker(&self.id, e)),
            };

            self.routes.dispatch(&self.id, &message).await;

            if let Err(e) = session.acknowledge(&message).await {
                warn!(
                    stream_id = %self.id,
                    topic = %message.topic,
                    error = %e,
                    "failed to acknowledge message"
                );
            }
        }
    }

    /// Drops the current session ahead of a reconnect.
    pub async fn begin_reconnect(&mut self) {
        self.close_session().await;
        if self.state() != StreamState::Stopped {
            self.set_state(StreamState::Reconnecting);
        }
    }

    /// Closes the session, if any, and stops the stream for good.
    ///
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        self.close_session().await;
        if self.state() != StreamState::Stopped {
            self.set_state(StreamState::Stopped);
            info!(stream_id = %self.id, "stream stopped");
        }
    }

    async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(stream_id = %self.id, error = %e, "failed to close broker session");
            }
        }
    }
}
