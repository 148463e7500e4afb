use std::collections::BTreeMap;

use crate::{Error, Result};

/// Broker-specific connection parameters of one stream (address, credentials,
/// consumer group and so on).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionParams(BTreeMap<String, String>);

impl ConnectionParams {
    /// Creates an empty parameter set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the value for `key`, or an error naming the missing key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Params`] when `key` is absent.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::Params {
            missing: vec![key.to_string()],
            unknown: Vec::new(),
        })
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Iterates keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Checks that every `required` key is present and every present key is
    /// in `required` or `optional`.
    ///
    /// # Errors
    ///
    /// Returns a single [`Error::Params`] naming every missing and unknown key.
    pub fn validate(&self, required: &[&str], optional: &[&str]) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|key| !self.0.contains_key(**key))
            .map(ToString::to_string)
            .collect();

        let unknown: Vec<String> = self
            .keys()
            .filter(|key| !required.contains(key) && !optional.contains(key))
            .map(ToString::to_string)
            .collect();

        if missing.is_empty() && unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::Params { missing, unknown })
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ConnectionParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for ConnectionParams {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
