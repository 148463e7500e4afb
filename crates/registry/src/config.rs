use std::collections::BTreeMap;

use serde::Deserialize;

const fn default_active() -> bool {
    true
}

/// Declarative description of one stream.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StreamConfig {
    /// Identifier, unique across the whole configuration.
    pub stream_id: String,

    /// Broker kind tag, resolved against the broker registry.
    pub broker_kind: String,

    /// Broker-specific parameters.
    #[serde(default)]
    pub connection_params: BTreeMap<String, String>,

    /// Topic bindings, in subscription order.
    #[serde(default)]
    pub topics: Vec<TopicBinding>,

    /// Inactive streams are validated for identifier clashes only.
    #[serde(default = "default_active")]
    pub active: bool,
}

impl StreamConfig {
    /// Creates an active stream with no parameters and no topics.
    pub fn new(stream_id: impl Into<String>, broker_kind: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            broker_kind: broker_kind.into(),
            connection_params: BTreeMap::new(),
            topics: Vec::new(),
            active: true,
        }
    }

    /// Adds a connection parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.connection_params.insert(key.into(), value.into());
        self
    }

    /// Binds handlers to a topic.
    #[must_use]
    pub fn with_topic<I, S>(mut self, topic: impl Into<String>, handlers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics.push(TopicBinding {
            topic: topic.into(),
            handlers: handlers.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Marks the stream inactive.
    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// A topic and the identifiers of the handlers it is routed to, in order.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TopicBinding {
    /// Topic name.
    pub topic: String,

    /// Handler identifiers.
    #[serde(default)]
    pub handlers: Vec<String>,
}
