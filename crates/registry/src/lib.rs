//! Turns declarative stream configuration into ready-to-connect streams.
//!
//! Broker kinds and handlers are looked up in explicit registries owned by the
//! caller. [`build`] checks every entry before constructing anything and
//! reports all problems together, so a bad configuration never reaches the
//! point of opening a connection.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;

pub use config::{StreamConfig, TopicBinding};
pub use error::{ConfigurationError, Error, Problem};

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug};
use std::sync::Arc;

use alertstreams_broker::{Broker, BrokerFactory, ConnectionParams};
use alertstreams_stream::{BoundHandler, HandlerRegistry, Stream, TopicRoutes};
use tracing::{debug, info, warn};

/// Broker factories keyed by kind tag.
#[derive(Clone, Default)]
pub struct BrokerRegistry {
    factories: HashMap<String, Arc<dyn BrokerFactory>>,
}

impl Debug for BrokerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl BrokerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under its own kind tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateBrokerKind`] if the kind is already taken.
    pub fn register<F>(&mut self, factory: F) -> Result<&mut Self, Error>
    where
        F: BrokerFactory,
    {
        self.register_shared(Arc::new(factory))
    }

    /// Registers an already shared factory under its own kind tag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateBrokerKind`] if the kind is already taken.
    pub fn register_shared(&mut self, factory: Arc<dyn BrokerFactory>) -> Result<&mut Self, Error> {
        let kind = factory.kind().to_string();
        if self.factories.contains_key(&kind) {
            return Err(Error::DuplicateBrokerKind(kind));
        }
        self.factories.insert(kind, factory);
        Ok(self)
    }

    /// Looks up the factory for `kind`.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn BrokerFactory>> {
        self.factories.get(kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Builds one unconnected [`Stream`] per active configuration entry, in
/// configuration order.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] listing every problem found across all
/// entries: empty or duplicate stream identifiers, unknown broker kinds,
/// rejected connection parameters, unresolved handlers, duplicate topics and
/// active streams without topics. No stream is returned if any problem exists.
pub fn build(
    configs: &[StreamConfig],
    handlers: &HandlerRegistry,
    brokers: &BrokerRegistry,
) -> Result<Vec<Stream>, ConfigurationError> {
    let mut problems = Vec::new();
    let mut streams = Vec::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (index, config) in configs.iter().enumerate() {
        let position = index + 1;

        let before = problems.len();

        if config.stream_id.is_empty() {
            problems.push(Problem::EmptyStreamId { position });
        } else if let Some(&first) = seen.get(config.stream_id.as_str()) {
            problems.push(Problem::DuplicateStreamId {
                stream_id: config.stream_id.clone(),
                first,
                second: position,
            });
        } else {
            seen.insert(&config.stream_id, position);
        }

        if !config.active {
            debug!(stream_id = %config.stream_id, "skipping inactive stream");
            continue;
        }

        // Entries with a bad identifier are still checked so every problem is reported.
        let broker = create_broker(config, brokers, &mut problems);
        let routes = bind_topics(config, handlers, &mut problems);

        if let (Some(broker), true) = (broker, problems.len() == before) {
            streams.push(Stream::new(
                config.stream_id.clone(),
                config.broker_kind.clone(),
                broker,
                routes,
            ));
        }
    }

    if problems.is_empty() {
        info!(streams = streams.len(), "built streams from configuration");
        Ok(streams)
    } else {
        Err(ConfigurationError::new(problems))
    }
}

fn create_broker(
    config: &StreamConfig,
    brokers: &BrokerRegistry,
    problems: &mut Vec<Problem>,
) -> Option<Box<dyn Broker>> {
    let Some(factory) = brokers.get(&config.broker_kind) else {
        problems.push(Problem::UnknownBrokerKind {
            stream_id: config.stream_id.clone(),
            broker_kind: config.broker_kind.clone(),
            known: brokers.kinds().join(", "),
        });
        return None;
    };

    let params = ConnectionParams::from(config.connection_params.clone());
    match factory.create(&params) {
        Ok(broker) => Some(broker),
        Err(source) => {
            problems.push(Problem::InvalidParams {
                stream_id: config.stream_id.clone(),
                source,
            });
            None
        }
    }
}

fn bind_topics(
    config: &StreamConfig,
    handlers: &HandlerRegistry,
    problems: &mut Vec<Problem>,
) -> TopicRoutes {
    let mut routes = TopicRoutes::new();

    if config.topics.is_empty() {
        problems.push(Problem::NoTopics {
            stream_id: config.stream_id.clone(),
        });
        return routes;
    }

    let mut topics = HashSet::new();
    for binding in &config.topics {
        if !topics.insert(binding.topic.as_str()) {
            problems.push(Problem::DuplicateTopic {
                stream_id: config.stream_id.clone(),
                topic: binding.topic.clone(),
            });
            continue;
        }

        let mut bound = Vec::with_capacity(binding.handlers.len());
        for id in &binding.handlers {
            match handlers.get(id) {
                Some(handler) => bound.push(BoundHandler::new(id.clone(), handler)),
                None => problems.push(Problem::UnresolvedHandler {
                    stream_id: config.stream_id.clone(),
                    topic: binding.topic.clone(),
                    handler: id.clone(),
                }),
            }
        }

        if binding.handlers.is_empty() {
            warn!(
                stream_id = %config.stream_id,
                topic = %binding.topic,
                "topic is subscribed without handlers"
            );
        }

        // Uniqueness was checked above.
        let _ = routes.bind(binding.topic.clone(), bound);
    }

    routes
}
