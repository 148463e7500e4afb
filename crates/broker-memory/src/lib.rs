//! In-process implementation of the broker interface.
//!
//! Useful for running streams locally without any broker infrastructure and as
//! the broker double in tests: a [`MemoryBroker`] is a cloneable handle on one
//! shared bus, messages are published with [`MemoryBroker::publish`], and
//! connection failures can be injected on demand.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod session;

pub use session::MemorySession;

use std::collections::VecDeque;
use std::sync::Arc;

use alertstreams_broker::{
    Broker, BrokerFactory, BrokerSession, ConnectionParams, Error, Message, Result, Sequence,
};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, trace};

/// Broker kind tag for the in-memory bus.
pub const KIND: &str = "memory";

/// Number of recent acknowledgements kept by the bus.
pub const ACK_HISTORY: usize = 256;

#[derive(Debug)]
enum Delivery {
    Message(Message),
    Severed,
}

#[derive(Debug)]
struct Subscriber {
    session_id: u64,
    topics: Vec<String>,
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Debug, Default)]
struct BusState {
    acks: usize,
    closed_sessions: usize,
    connects: usize,
    failing_connects: usize,
    next_offset: i64,
    next_session_id: u64,
    recent_acks: VecDeque<Sequence>,
    subscribers: Vec<Subscriber>,
}

/// A shared in-memory message bus.
#[derive(Clone, Debug)]
pub struct MemoryBroker {
    live_sessions: watch::Sender<usize>,
    state: Arc<Mutex<BusState>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            live_sessions: watch::channel(0).0,
            state: Arc::new(Mutex::new(BusState::default())),
        }
    }

    /// Publishes a message to every session currently subscribed to `topic`.
    ///
    /// Returns the number of sessions it was delivered to.
    pub async fn publish(&self, topic: impl Into<String>, payload: impl Into<Bytes>) -> usize {
        let topic = topic.into();
        let payload = payload.into();

        let mut state = self.state.lock().await;
        let offset = state.next_offset;
        state.next_offset += 1;

        let message = Message::new(topic.clone(), payload).with_sequence(Sequence::new(0, offset));

        let mut delivered = 0;
        for subscriber in &state.subscribers {
            if subscriber.topics.contains(&topic)
                && subscriber
                    .sender
                    .send(Delivery::Message(message.clone()))
                    .is_ok()
            {
                delivered += 1;
            }
        }
        drop(state);

        trace!(%topic, offset, delivered, "published to memory bus");
        delivered
    }

    /// Makes the next `count` connection attempts fail with a retryable error.
    pub async fn fail_next_connects(&self, count: usize) {
        self.state.lock().await.failing_connects = count;
    }

    /// Breaks every live session subscribed to `topic`; their next receive
    /// fails with a connection error.
    pub async fn sever_topic(&self, topic: &str) {
        self.detach(|subscriber| subscriber.topics.iter().any(|t| t == topic), true)
            .await;
    }

    /// Breaks every live session.
    pub async fn sever_sessions(&self) {
        self.detach(|_| true, true).await;
    }

    /// Ends every live session cleanly; their next receive reports the end of
    /// the stream.
    pub async fn finish(&self) {
        self.detach(|_| true, false).await;
    }

    /// Waits until at least `count` sessions are connected.
    pub async fn wait_for_sessions(&self, count: usize) {
        let mut receiver = self.live_sessions.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|live| *live >= count).await;
    }

    /// Number of currently connected sessions.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        *self.live_sessions.borrow()
    }

    /// Number of successful connections made so far.
    pub async fn connects(&self) -> usize {
        self.state.lock().await.connects
    }

    /// Number of sessions closed by their owner.
    pub async fn closed_sessions(&self) -> usize {
        self.state.lock().await.closed_sessions
    }

    /// Number of acknowledgements received so far.
    pub async fn acks(&self) -> usize {
        self.state.lock().await.acks
    }

    /// The last [`ACK_HISTORY`] acknowledged positions, oldest first.
    pub async fn acknowledged(&self) -> Vec<Sequence> {
        self.state.lock().await.recent_acks.iter().copied().collect()
    }

    async fn detach<F>(&self, predicate: F, severed: bool)
    where
        F: Fn(&Subscriber) -> bool,
    {
        let mut state = self.state.lock().await;
        let (detached, kept): (Vec<_>, Vec<_>) =
            state.subscribers.drain(..).partition(|s| predicate(s));
        state.subscribers = kept;
        let remaining = state.subscribers.len();
        drop(state);

        for subscriber in detached {
            debug!(session_id = subscriber.session_id, severed, "detaching memory session");
            if severed {
                let _ = subscriber.sender.send(Delivery::Severed);
            }
        }

        self.live_sessions.send_replace(remaining);
    }

    async fn release(&self, session_id: u64) {
        let mut state = self.state.lock().await;
        state.closed_sessions += 1;
        state
            .subscribers
            .retain(|subscriber| subscriber.session_id != session_id);
        let remaining = state.subscribers.len();
        drop(state);

        self.live_sessions.send_replace(remaining);
    }

    async fn record_ack(&self, sequence: Sequence) {
        let mut state = self.state.lock().await;
        state.acks += 1;
        if state.recent_acks.len() == ACK_HISTORY {
            state.recent_acks.pop_front();
        }
        state.recent_acks.push_back(sequence);
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self, topics: &[String]) -> Result<Box<dyn BrokerSession>> {
        let mut state = self.state.lock().await;

        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(Error::connection("memory broker refused the connection"));
        }

        let session_id = state.next_session_id;
        state.next_session_id += 1;
        state.connects += 1;

        let (sender, receiver) = mpsc::unbounded_channel();
        state.subscribers.push(Subscriber {
            session_id,
            topics: topics.to_vec(),
            sender,
        });
        let live = state.subscribers.len();
        drop(state);

        self.live_sessions.send_replace(live);
        debug!(session_id, ?topics, "memory session connected");

        Ok(Box::new(MemorySession::new(
            self.clone(),
            session_id,
            receiver,
        )))
    }
}

/// Builds `memory` brokers that all share one bus.
#[derive(Clone, Debug, Default)]
pub struct MemoryBrokerFactory {
    broker: MemoryBroker,
}

impl MemoryBrokerFactory {
    /// Creates a factory handing out `broker`.
    #[must_use]
    pub const fn new(broker: MemoryBroker) -> Self {
        Self { broker }
    }

    /// The shared bus.
    #[must_use]
    pub const fn broker(&self) -> &MemoryBroker {
        &self.broker
    }
}

impl BrokerFactory for MemoryBrokerFactory {
    fn kind(&self) -> &str {
        KIND
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn Broker>> {
        params.validate(&[], &[])?;
        Ok(Box::new(self.broker.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_delivers_only_subscribed_topics_in_order() {
        let broker = MemoryBroker::new();
        let mut session = broker.connect(&topics(&["alerts"])).await.unwrap();

        broker.publish("alerts", "one").await;
        broker.publish("other", "ignored").await;
        broker.publish("alerts", "two").await;

        let first = session.receive().await.unwrap().unwrap();
        let second = session.receive().await.unwrap().unwrap();

        assert_eq!(first.payload, Bytes::from("one"));
        assert_eq!(second.payload, Bytes::from("two"));
        assert!(first.sequence.unwrap().offset() < second.sequence.unwrap().offset());
    }

    #[tokio::test]
    async fn test_ack_history_is_bounded() {
        let broker = MemoryBroker::new();
        let mut session = broker.connect(&topics(&["alerts"])).await.unwrap();

        for _ in 0..ACK_HISTORY + 10 {
            broker.publish("alerts", "beat").await;
            let message = session.receive().await.unwrap().unwrap();
            session.acknowledge(&message).await.unwrap();
        }

        let recent = broker.acknowledged().await;
        assert_eq!(broker.acks().await, ACK_HISTORY + 10);
        assert_eq!(recent.len(), ACK_HISTORY);
        assert_eq!(recent[0].offset(), 10);
    }

    #[tokio::test]
    async fn test_sever_topic_only_breaks_matching_sessions() {
        let broker = MemoryBroker::new();
        let mut alerts = broker.connect(&topics(&["alerts"])).await.unwrap();
        let mut notices = broker.connect(&topics(&["notices"])).await.unwrap();

        broker.sever_topic("alerts").await;
        broker.publish("notices", "still here").await;

        assert_matches!(alerts.receive().await, Err(Error::Connection(_)));
        assert_matches!(notices.receive().await, Ok(Some(message)) => {
            assert_eq!(message.topic, "notices");
        });
        assert_eq!(broker.live_sessions(), 1);
    }

    #[tokio::test]
    async fn test_finish_reports_end_of_stream() {
        let broker = MemoryBroker::new();
        let mut session = broker.connect(&topics(&["alerts"])).await.unwrap();

        broker.finish().await;

        assert_matches!(session.receive().await, Ok(None));
    }

    #[tokio::test]
    async fn test_injected_connect_failures_are_retryable() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(2).await;

        for _ in 0..2 {
            let error = broker.connect(&topics(&["alerts"])).await.err().unwrap();
            assert!(error.is_retryable());
        }

        assert!(broker.connect(&topics(&["alerts"])).await.is_ok());
        assert_eq!(broker.connects().await, 1);
    }

    #[tokio::test]
    async fn test_close_releases_session() {
        let broker = MemoryBroker::new();
        let mut session = broker.connect(&topics(&["alerts"])).await.unwrap();
        assert_eq!(broker.live_sessions(), 1);

        session.close().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(broker.live_sessions(), 0);
        assert_eq!(broker.closed_sessions().await, 1);
        assert_eq!(broker.publish("alerts", "nobody listening").await, 0);
    }

    #[test]
    fn test_factory_rejects_parameters() {
        let factory = MemoryBrokerFactory::default();
        let params: ConnectionParams = [("servers", "nats://localhost")].into_iter().collect();

        assert_eq!(factory.kind(), "memory");
        assert_matches!(factory.create(&params), Err(Error::Params { unknown, .. }) => {
            assert_eq!(unknown, vec!["servers"]);
        });
        assert!(factory.create(&ConnectionParams::new()).is_ok());
    }
}
