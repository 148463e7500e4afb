//! Configuration file format.

use std::path::Path;
use std::time::Duration;

use alertstreams_registry::StreamConfig;
use alertstreams_supervisor::BackoffPolicy;
use serde::Deserialize;

use crate::Error;

/// Top-level configuration file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Reconnection settings.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Streams to run.
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

/// Reconnection settings, in milliseconds.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// First reconnection delay.
    pub initial_backoff_ms: u64,

    /// Longest reconnection delay.
    pub max_backoff_ms: u64,

    /// Consumption time after which delays start over.
    pub reset_after_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 60_000,
            reset_after_ms: 30_000,
        }
    }
}

impl SupervisorConfig {
    /// The backoff policy these settings describe.
    #[must_use]
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
            reset_after: Duration::from_millis(self.reset_after_ms),
            ..BackoffPolicy::default()
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.initial_backoff_ms == 0 {
            return Err(Error::Supervisor(
                "initial_backoff_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(Error::Supervisor(format!(
                "max_backoff_ms ({}) is below initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, has
    /// unknown fields, or has unusable supervisor settings.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&raw)
    }

    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid TOML, unknown fields or unusable
    /// supervisor settings.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(raw)?;
        config.supervisor.validate()?;
        Ok(config)
    }
}
