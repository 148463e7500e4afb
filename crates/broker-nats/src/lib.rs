//! NATS implementation of the broker interface.
//!
//! Each bound topic is a NATS subject; a session holds one core subscription
//! per subject (optionally within a queue group) and merges them in arrival
//! order.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod session;

pub use session::NatsSession;

use std::fmt::{self, Debug};
use std::path::PathBuf;
use std::time::Duration;

use alertstreams_broker::{Broker, BrokerFactory, BrokerSession, ConnectionParams, Error, Result};
use async_nats::{ConnectErrorKind, ConnectOptions};
use async_trait::async_trait;
use futures::stream::select_all;
use tracing::{debug, info};

/// Broker kind tag for NATS.
pub const KIND: &str = "nats";

const REQUIRED: &[&str] = &["servers"];
const OPTIONAL: &[&str] = &[
    "client_name",
    "connection_timeout_secs",
    "credentials_file",
    "password",
    "queue_group",
    "token",
    "username",
];

#[derive(Clone, PartialEq, Eq)]
enum NatsAuth {
    Anonymous,
    CredentialsFile(PathBuf),
    Token(String),
    UserAndPassword { username: String, password: String },
}

impl Debug for NatsAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::CredentialsFile(path) => f.debug_tuple("CredentialsFile").field(path).finish(),
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::UserAndPassword { username, .. } => f
                .debug_struct("UserAndPassword")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// A NATS server (or cluster) that streams subscribe to.
#[derive(Clone, Debug)]
pub struct NatsBroker {
    auth: NatsAuth,
    client_name: Option<String>,
    connection_timeout: Duration,
    queue_group: Option<String>,
    servers: String,
}

impl NatsBroker {
    /// Builds a broker from validated connection parameters.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown keys, a missing `servers`
    /// key, or conflicting credentials.
    pub fn from_params(params: &ConnectionParams) -> Result<Self> {
        params.validate(REQUIRED, OPTIONAL)?;

        let servers = params.require("servers")?.trim().to_string();
        if servers.is_empty() {
            return Err(Error::InvalidParam {
                key: "servers".to_string(),
                reason: "must name at least one server".to_string(),
            });
        }

        let auth = match (
            params.get("username"),
            params.get("password"),
            params.get("token"),
            params.get("credentials_file"),
        ) {
            (None, None, None, None) => NatsAuth::Anonymous,
            (Some(username), Some(password), None, None) => NatsAuth::UserAndPassword {
                username: username.to_string(),
                password: password.to_string(),
            },
            (None, None, Some(token), None) => NatsAuth::Token(token.to_string()),
            (None, None, None, Some(path)) => NatsAuth::CredentialsFile(PathBuf::from(path)),
            (Some(_), None, None, None) | (None, Some(_), None, None) => {
                return Err(Error::InvalidParam {
                    key: "username".to_string(),
                    reason: "username and password must be given together".to_string(),
                });
            }
            _ => {
                return Err(Error::Configuration(
                    "only one of username/password, token or credentials_file may be set"
                        .to_string(),
                ));
            }
        };

        let connection_timeout = match params.get("connection_timeout_secs") {
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| Error::InvalidParam {
                    key: "connection_timeout_secs".to_string(),
                    reason: e.to_string(),
                })?,
            None => Duration::from_secs(5),
        };

        Ok(Self {
            auth,
            client_name: params.get("client_name").map(ToString::to_string),
            connection_timeout,
            queue_group: params.get("queue_group").map(ToString::to_string),
            servers,
        })
    }

    async fn connect_options(&self) -> Result<ConnectOptions> {
        let options = match &self.auth {
            NatsAuth::Anonymous => ConnectOptions::new(),
            NatsAuth::UserAndPassword { username, password } => {
                ConnectOptions::with_user_and_password(username.clone(), password.clone())
            }
            NatsAuth::Token(token) => ConnectOptions::with_token(token.clone()),
            NatsAuth::CredentialsFile(path) => ConnectOptions::with_credentials_file(path.clone())
                .await
                .map_err(|e| Error::InvalidParam {
                    key: "credentials_file".to_string(),
                    reason: e.to_string(),
                })?,
        };

        let options = options
            .connection_timeout(self.connection_timeout)
            .event_callback(|event| async move {
                info!(%event, "nats connection event");
            });

        Ok(match &self.client_name {
            Some(name) => options.name(name.clone()),
            None => options,
        })
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn connect(&self, topics: &[String]) -> Result<Box<dyn BrokerSession>> {
        require_literal_subjects(topics)?;

        let client = self
            .connect_options()
            .await?
            .connect(self.servers.as_str())
            .await
            .map_err(|e| match e.kind() {
                ConnectErrorKind::ServerParse => Error::InvalidParam {
                    key: "servers".to_string(),
                    reason: e.to_string(),
                },
                _ => Error::connection(e),
            })?;

        let mut subscribers = Vec::with_capacity(topics.len());
        for topic in topics {
            let subscriber = match &self.queue_group {
                Some(group) => client.queue_subscribe(topic.clone(), group.clone()).await,
                None => client.subscribe(topic.clone()).await,
            }
            .map_err(Error::connection)?;

            debug!(subject = %topic, queue_group = ?self.queue_group, "subscribed");
            subscribers.push(subscriber);
        }

        Ok(Box::new(NatsSession::new(client, select_all(subscribers))))
    }
}

/// Messages are routed by their exact subject, so wildcard subscriptions
/// would deliver subjects no route matches.
fn require_literal_subjects(topics: &[String]) -> Result<()> {
    match topics
        .iter()
        .find(|topic| topic.split('.').any(|token| matches!(token, "*" | ">")))
    {
        Some(topic) => Err(Error::Configuration(format!(
            "subject `{topic}` contains a wildcard; only literal subjects can be routed"
        ))),
        None => Ok(()),
    }
}

/// Builds `nats` brokers.
#[derive(Clone, Copy, Debug, Default)]
pub struct NatsBrokerFactory;

impl BrokerFactory for NatsBrokerFactory {
    fn kind(&self) -> &str {
        KIND
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn Broker>> {
        Ok(Box::new(NatsBroker::from_params(params)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    fn params(pairs: &[(&str, &str)]) -> ConnectionParams {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_user_and_password() {
        let broker = NatsBroker::from_params(&params(&[
            ("servers", "nats://localhost:4222"),
            ("username", "tom"),
            ("password", "secret"),
            ("queue_group", "listeners"),
        ]))
        .unwrap();

        assert_eq!(
            broker.auth,
            NatsAuth::UserAndPassword {
                username: "tom".to_string(),
                password: "secret".to_string(),
            }
        );
        assert_eq!(broker.queue_group.as_deref(), Some("listeners"));
        assert!(!format!("{broker:?}").contains("secret"));
    }

    #[test]
    fn test_missing_servers() {
        assert_matches!(
            NatsBroker::from_params(&params(&[("token", "t")])),
            Err(Error::Params { missing, .. }) if missing == vec!["servers"]
        );
    }

    #[test]
    fn test_password_without_username() {
        assert_matches!(
            NatsBroker::from_params(&params(&[("servers", "localhost"), ("password", "p")])),
            Err(Error::InvalidParam { key, .. }) if key == "username"
        );
    }

    #[test]
    fn test_conflicting_credentials() {
        assert_matches!(
            NatsBroker::from_params(&params(&[
                ("servers", "localhost"),
                ("token", "t"),
                ("credentials_file", "/etc/nats.creds"),
            ])),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_bad_timeout() {
        assert_matches!(
            NatsBroker::from_params(&params(&[
                ("servers", "localhost"),
                ("connection_timeout_secs", "soon"),
            ])),
            Err(Error::InvalidParam { key, .. }) if key == "connection_timeout_secs"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        let broker = NatsBroker::from_params(&params(&[
            ("servers", "nats://127.0.0.1:1"),
            ("connection_timeout_secs", "1"),
        ]))
        .unwrap();

        let error = broker
            .connect(&["alerts".to_string()])
            .await
            .err()
            .unwrap();

        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn test_wildcard_subjects_are_rejected_before_connecting() {
        let broker = NatsBroker::from_params(&params(&[("servers", "nats://127.0.0.1:1")]))
            .unwrap();

        for subject in ["alerts.>", "*", "gcn.*.notices"] {
            assert_matches!(
                broker
                    .connect(&["alerts".to_string(), subject.to_string()])
                    .await
                    .err(),
                Some(Error::Configuration(message)) if message.contains(subject)
            );
        }
    }
}
