use std::error::Error as StdError;

use thiserror::Error;

/// Result type for broker operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by broker variants.
#[derive(Debug, Error)]
pub enum Error {
    /// Transient network or authentication failure.
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn StdError + Send + Sync>),

    /// The parameters are structurally wrong for this broker kind.
    #[error("{}", describe_params(.missing, .unknown))]
    Params {
        /// Required keys that were not supplied.
        missing: Vec<String>,
        /// Supplied keys this broker kind does not accept.
        unknown: Vec<String>,
    },

    /// A parameter is present but its value cannot be used.
    #[error("invalid value for parameter `{key}`: {reason}")]
    InvalidParam {
        /// The offending key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Any other problem that retrying cannot fix.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Wraps anything error-like as a retryable connection failure.
    pub fn connection<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::Connection(error.into())
    }

    /// Whether the caller may retry the failed operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

fn describe_params(missing: &[String], unknown: &[String]) -> String {
    let mut parts = Vec::with_capacity(2);
    if !missing.is_empty() {
        parts.push(format!("missing required parameters: {}", missing.join(", ")));
    }
    if !unknown.is_empty() {
        parts.push(format!("unknown parameters: {}", unknown.join(", ")));
    }
    parts.join("; ")
}
