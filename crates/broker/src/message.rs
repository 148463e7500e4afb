use std::collections::HashMap;

use bytes::Bytes;

/// Message headers, when the broker carries any.
pub type Headers = HashMap<String, String>;

/// Broker-assigned position of a message.
///
/// Only meaningful to the session that delivered the message, which may use it
/// to acknowledge delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Sequence {
    partition: i32,
    offset: i64,
}

impl Sequence {
    /// Creates a position within `partition`.
    #[must_use]
    pub const fn new(partition: i32, offset: i64) -> Self {
        Self { partition, offset }
    }

    /// The partition (or shard) the message was read from.
    #[must_use]
    pub const fn partition(&self) -> i32 {
        self.partition
    }

    /// The offset within the partition.
    #[must_use]
    pub const fn offset(&self) -> i64 {
        self.offset
    }
}

/// A message delivered by a broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The topic the message was published to.
    pub topic: String,

    /// The raw payload.
    pub payload: Bytes,

    /// Optional headers.
    pub headers: Option<Headers>,

    /// Optional broker position, used for acknowledgement.
    pub sequence: Option<Sequence>,
}

impl Message {
    /// Creates a message with no headers and no sequence.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            headers: None,
            sequence: None,
        }
    }

    /// Attaches a broker position.
    #[must_use]
    pub const fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Attaches headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }
}
