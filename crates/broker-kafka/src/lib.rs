//! Kafka implementation of the broker interface.
//!
//! Three broker kinds share one consumer implementation and differ only in how
//! their connection parameters turn into librdkafka settings:
//!
//! - `kafka`: any Kafka cluster, configured directly.
//! - `hopskotch`: SCiMMA Hopskotch, addressed by a `kafka://` URL and SCRAM
//!   credentials.
//! - `gcn`: NASA GCN Kafka, authenticated with OIDC client credentials.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod kinds;
mod session;

pub use kinds::{GcnBrokerFactory, HopskotchBrokerFactory, KafkaBrokerFactory};
pub use session::KafkaSession;

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use alertstreams_broker::{Broker, BrokerSession, Error, Result};
use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use tracing::{debug, info};

const SECRET_SETTINGS: &[&str] = &["sasl.password", "sasl.oauthbearer.client.secret"];

/// A Kafka cluster plus the consumer settings one stream uses against it.
#[derive(Clone)]
pub struct KafkaBroker {
    kind: &'static str,
    metadata_timeout: Duration,
    settings: Vec<(String, String)>,
}

impl Debug for KafkaBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings: Vec<(&str, &str)> = self
            .settings
            .iter()
            .map(|(key, value)| {
                if SECRET_SETTINGS.contains(&key.as_str()) {
                    (key.as_str(), "<redacted>")
                } else {
                    (key.as_str(), value.as_str())
                }
            })
            .collect();

        f.debug_struct("KafkaBroker")
            .field("kind", &self.kind)
            .field("metadata_timeout", &self.metadata_timeout)
            .field("settings", &settings)
            .finish()
    }
}

impl KafkaBroker {
    pub(crate) fn new(
        kind: &'static str,
        bootstrap_servers: &str,
        group_id: String,
        start_position: &str,
    ) -> Self {
        let mut broker = Self {
            kind,
            metadata_timeout: Duration::from_secs(10),
            settings: Vec::new(),
        };

        broker
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group_id)
            .set("auto.offset.reset", start_position)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false");

        broker
    }

    pub(crate) fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.settings.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.settings.push((key.to_string(), value)),
        }
        self
    }

    /// The broker kind this configuration was built for.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.kind
    }

    /// Returns a librdkafka setting.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        for (key, value) in &self.settings {
            config.set(key, value);
        }
        config
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn connect(&self, topics: &[String]) -> Result<Box<dyn BrokerSession>> {
        let consumer: StreamConsumer = self.client_config().create().map_err(|e| {
            Error::Configuration(format!("failed to create {} consumer: {e}", self.kind))
        })?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| Error::Configuration(format!("failed to subscribe to {topics:?}: {e}")))?;

        // The subscription is lazy; a metadata round trip proves the cluster is
        // reachable and the credentials are accepted.
        let consumer = Arc::new(consumer);
        let probe = Arc::clone(&consumer);
        let timeout = self.metadata_timeout;
        let brokers = tokio::task::spawn_blocking(move || {
            probe
                .fetch_metadata(None, timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(Error::connection)?
        .map_err(Error::connection)?;

        debug!(kind = self.kind, brokers, "fetched kafka metadata");
        info!(kind = self.kind, ?topics, "kafka consumer subscribed");

        Ok(Box::new(KafkaSession::new(consumer)))
    }
}
