use std::fmt::{self, Display};

use alertstreams_broker::Error as BrokerError;
use thiserror::Error;

/// Errors from assembling the registries.
#[derive(Debug, Error)]
pub enum Error {
    /// A broker kind was registered twice.
    #[error("broker kind `{0}` is already registered")]
    DuplicateBrokerKind(String),
}

/// One problem found in the stream configuration.
#[derive(Debug, Error)]
pub enum Problem {
    /// Entry with an empty identifier (1-based position).
    #[error("stream entry #{position} has an empty stream_id")]
    EmptyStreamId {
        /// Position in the configuration.
        position: usize,
    },

    /// Two entries share an identifier.
    #[error("stream `{stream_id}` is defined twice (entries #{first} and #{second})")]
    DuplicateStreamId {
        /// Shared identifier.
        stream_id: String,
        /// Position of the first definition.
        first: usize,
        /// Position of the clashing definition.
        second: usize,
    },

    /// No factory is registered for the broker kind.
    #[error("stream `{stream_id}`: unknown broker kind `{broker_kind}` (known kinds: {known})")]
    UnknownBrokerKind {
        /// Stream identifier.
        stream_id: String,
        /// Requested kind.
        broker_kind: String,
        /// Registered kinds, comma separated.
        known: String,
    },

    /// The broker factory rejected the connection parameters.
    #[error("stream `{stream_id}`: {source}")]
    InvalidParams {
        /// Stream identifier.
        stream_id: String,
        /// Factory error.
        source: BrokerError,
    },

    /// A topic references a handler that was never registered.
    #[error("stream `{stream_id}`: topic `{topic}` references unregistered handler `{handler}`")]
    UnresolvedHandler {
        /// Stream identifier.
        stream_id: String,
        /// Topic name.
        topic: String,
        /// Handler identifier.
        handler: String,
    },

    /// A topic is bound twice within one stream.
    #[error("stream `{stream_id}`: topic `{topic}` is listed more than once")]
    DuplicateTopic {
        /// Stream identifier.
        stream_id: String,
        /// Topic name.
        topic: String,
    },

    /// An active stream binds no topics.
    #[error("stream `{stream_id}` has no topics")]
    NoTopics {
        /// Stream identifier.
        stream_id: String,
    },
}

/// Every problem found while building streams from configuration.
#[derive(Debug, Error)]
pub struct ConfigurationError {
    problems: Vec<Problem>,
}

impl ConfigurationError {
    pub(crate) const fn new(problems: Vec<Problem>) -> Self {
        Self { problems }
    }

    /// The individual problems, in configuration order.
    #[must_use]
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// Consumes the error, returning its problems.
    #[must_use]
    pub fn into_problems(self) -> Vec<Problem> {
        self.problems
    }
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid stream configuration ({} problem{})",
            self.problems.len(),
            if self.problems.len() == 1 { "" } else { "s" }
        )?;
        for problem in &self.problems {
            write!(f, "\n  - {problem}")?;
        }
        Ok(())
    }
}
