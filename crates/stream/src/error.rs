use alertstreams_broker::Error as BrokerError;
use thiserror::Error;

/// Errors from building and running streams.
#[derive(Debug, Error)]
pub enum Error {
    /// The broker connection failed or dropped; the stream may reconnect.
    #[error("stream `{stream_id}` lost its connection: {source}")]
    Connection {
        /// Stream identifier.
        stream_id: String,
        /// Underlying broker failure.
        #[source]
        source: BrokerError,
    },

    /// The broker rejected the stream's configuration; retrying cannot help.
    #[error("stream `{stream_id}` is misconfigured: {source}")]
    Configuration {
        /// Stream identifier.
        stream_id: String,
        /// Underlying broker failure.
        #[source]
        source: BrokerError,
    },

    /// A handler identifier was registered twice.
    #[error("handler `{0}` is already registered")]
    DuplicateHandler(String),

    /// A topic was bound twice within one stream.
    #[error("topic `{0}` is bound more than once")]
    DuplicateTopic(String),

    /// Consumption was requested without a live session.
    #[error("stream `{0}` is not connected")]
    NotConnected(String),

    /// The stream has been closed for good.
    #[error("stream `{0}` is stopped")]
    Stopped(String),
}

impl Error {
    pub(crate) fn from_broker(stream_id: &str, source: BrokerError) -> Self {
        let stream_id = stream_id.to_string();
        if source.is_retryable() {
            Self::Connection { stream_id, source }
        } else {
            Self::Configuration { stream_id, source }
        }
    }

    /// Whether reconnecting may clear the error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::NotConnected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[test]
    fn test_classifies_broker_errors() {
        let dropped = Error::from_broker("gcn", BrokerError::connection("socket closed"));
        assert_matches!(&dropped, Error::Connection { stream_id, .. } if stream_id == "gcn");
        assert!(dropped.is_retryable());

        let rejected = Error::from_broker("gcn", BrokerError::Configuration("bad".to_string()));
        assert_matches!(rejected, Error::Configuration { .. });
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn test_stopped_is_final() {
        assert!(!Error::Stopped("gcn".to_string()).is_retryable());
    }
}
