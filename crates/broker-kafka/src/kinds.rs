use alertstreams_broker::{Broker, BrokerFactory, ConnectionParams, Error, Result};
use url::Url;
use uuid::Uuid;

use crate::KafkaBroker;

const DEFAULT_KAFKA_PORT: u16 = 9092;
const DEFAULT_GCN_DOMAIN: &str = "gcn.nasa.gov";

fn start_position(params: &ConnectionParams) -> Result<&'static str> {
    match params.get("start_position").map(str::to_ascii_lowercase).as_deref() {
        None | Some("latest") => Ok("latest"),
        Some("earliest") => Ok("earliest"),
        Some(other) => Err(Error::InvalidParam {
            key: "start_position".to_string(),
            reason: format!("expected `latest` or `earliest`, got `{other}`"),
        }),
    }
}

fn group_id(params: &ConnectionParams, prefix: &str) -> String {
    params
        .get("group_id")
        .map_or_else(|| format!("{prefix}-{}", Uuid::new_v4()), ToString::to_string)
}

impl KafkaBroker {
    /// Builds a broker for a plain Kafka cluster.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for missing or unknown keys, or for
    /// credentials given without a SASL mechanism.
    pub fn kafka(params: &ConnectionParams) -> Result<Self> {
        params.validate(
            &["bootstrap_servers"],
            &[
                "group_id",
                "password",
                "sasl_mechanism",
                "security_protocol",
                "start_position",
                "username",
            ],
        )?;

        let mut broker = Self::new(
            KafkaBrokerFactory::KIND,
            params.require("bootstrap_servers")?,
            group_id(params, "alertstreams"),
            start_position(params)?,
        );

        if let Some(protocol) = params.get("security_protocol") {
            broker.set("security.protocol", protocol);
        }

        match (
            params.get("sasl_mechanism"),
            params.get("username"),
            params.get("password"),
        ) {
            (Some(mechanism), Some(username), Some(password)) => {
                broker
                    .set("sasl.mechanism", mechanism)
                    .set("sasl.username", username)
                    .set("sasl.password", password);
            }
            (None, None, None) => {}
            (Some(_), _, _) => {
                return Err(Error::Configuration(
                    "sasl_mechanism requires both username and password".to_string(),
                ));
            }
            (None, _, _) => {
                return Err(Error::Configuration(
                    "username and password require a sasl_mechanism".to_string(),
                ));
            }
        }

        Ok(broker)
    }

    /// Builds a broker for SCiMMA Hopskotch.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for missing or unknown keys, or a `url`
    /// that is not of the form `kafka://host[:port]/`.
    pub fn hopskotch(params: &ConnectionParams) -> Result<Self> {
        params.validate(
            &["url", "username", "password"],
            &["group_id", "start_position"],
        )?;

        let bootstrap_servers = hopskotch_bootstrap(params.require("url")?)?;
        let username = params.require("username")?;

        let mut broker = Self::new(
            HopskotchBrokerFactory::KIND,
            &bootstrap_servers,
            group_id(params, username),
            start_position(params)?,
        );
        broker
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanism", "SCRAM-SHA-512")
            .set("sasl.username", username)
            .set("sasl.password", params.require("password")?);

        Ok(broker)
    }

    /// Builds a broker for NASA GCN Kafka.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for missing or unknown keys.
    pub fn gcn(params: &ConnectionParams) -> Result<Self> {
        params.validate(
            &["client_id", "client_secret"],
            &["domain", "group_id", "start_position"],
        )?;

        let domain = params.get("domain").unwrap_or(DEFAULT_GCN_DOMAIN);
        let client_id = params.require("client_id")?;

        let mut broker = Self::new(
            GcnBrokerFactory::KIND,
            &format!("kafka.{domain}"),
            group_id(params, client_id),
            start_position(params)?,
        );
        broker
            .set("security.protocol", "sasl_ssl")
            .set("sasl.mechanisms", "OAUTHBEARER")
            .set("sasl.oauthbearer.method", "oidc")
            .set("sasl.oauthbearer.client.id", client_id)
            .set("sasl.oauthbearer.client.secret", params.require("client_secret")?)
            .set(
                "sasl.oauthbearer.token.endpoint.url",
                format!("https://auth.{domain}/oauth2/token"),
            );

        Ok(broker)
    }
}

fn hopskotch_bootstrap(raw: &str) -> Result<String> {
    let invalid = |reason: String| Error::InvalidParam {
        key: "url".to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;

    if url.scheme() != "kafka" {
        return Err(invalid(format!(
            "expected a kafka:// url, got scheme `{}`",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| invalid("url has no host".to_string()))?;

    if !matches!(url.path(), "" | "/") {
        return Err(invalid(
            "topics belong in the stream's topic list, not in the url".to_string(),
        ));
    }

    Ok(format!(
        "{host}:{}",
        url.port().unwrap_or(DEFAULT_KAFKA_PORT)
    ))
}

/// Builds `kafka` brokers.
#[derive(Clone, Copy, Debug, Default)]
pub struct KafkaBrokerFactory;

impl KafkaBrokerFactory {
    /// Broker kind tag.
    pub const KIND: &'static str = "kafka";
}

impl BrokerFactory for KafkaBrokerFactory {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn Broker>> {
        Ok(Box::new(KafkaBroker::kafka(params)?))
    }
}

/// Builds `hopskotch` brokers.
#[derive(Clone, Copy, Debug, Default)]
pub struct HopskotchBrokerFactory;

impl HopskotchBrokerFactory {
    /// Broker kind tag.
    pub const KIND: &'static str = "hopskotch";
}

impl BrokerFactory for HopskotchBrokerFactory {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn Broker>> {
        Ok(Box::new(KafkaBroker::hopskotch(params)?))
    }
}

/// Builds `gcn` brokers.
#[derive(Clone, Copy, Debug, Default)]
pub struct GcnBrokerFactory;

impl GcnBrokerFactory {
    /// Broker kind tag.
    pub const KIND: &'static str = "gcn";
}

impl BrokerFactory for GcnBrokerFactory {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn Broker>> {
        Ok(Box::new(KafkaBroker::gcn(params)?))
    }
}
