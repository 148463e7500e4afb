//! Abstract interface for the message brokers that alert streams listen to.
//!
//! Every broker family (in-memory, NATS, Kafka and its hosted flavours) is a
//! variant of the same narrow capability: a [`BrokerFactory`] validates the
//! connection parameters of one configured stream and produces a [`Broker`];
//! the broker opens [`BrokerSession`]s which deliver [`Message`]s until the
//! connection drops.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod message;
mod params;

pub use error::{Error, Result};
pub use message::{Headers, Message, Sequence};
pub use params::ConnectionParams;

use std::fmt::Debug;

use async_trait::async_trait;

/// A configured, not yet connected, handle on one broker.
#[async_trait]
pub trait Broker
where
    Self: Debug + Send + Sync + 'static,
{
    /// Establishes a session subscribed to the given topics, in order.
    ///
    /// Network and authentication failures are reported as
    /// [`Error::Connection`], which callers may retry. Anything else means the
    /// parameters can never work and must not be retried.
    async fn connect(&self, topics: &[String]) -> Result<Box<dyn BrokerSession>>;
}

/// A live broker session owned by exactly one stream.
#[async_trait]
pub trait BrokerSession
where
    Self: Send + 'static,
{
    /// Waits for the next message.
    ///
    /// Returns `Ok(None)` when the broker signals the end of the stream.
    async fn receive(&mut self) -> Result<Option<Message>>;

    /// Acknowledges a message once its handlers have run.
    async fn acknowledge(&mut self, _message: &Message) -> Result<()> {
        Ok(())
    }

    /// Releases the session.
    async fn close(&mut self) -> Result<()>;
}

/// Constructs brokers of one kind from declarative connection parameters.
pub trait BrokerFactory
where
    Self: Send + Sync + 'static,
{
    /// The broker kind tag used in stream configuration.
    fn kind(&self) -> &str;

    /// Validates `params` and builds a broker without touching the network.
    ///
    /// # Errors
    ///
    /// Returns a non-retryable error describing every problem with `params`.
    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn Broker>>;
}
