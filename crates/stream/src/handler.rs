use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::Debug;
use std::sync::Arc;

use alertstreams_broker::Message;
use async_trait::async_trait;
use thiserror::Error;

use crate::Error;

/// Failure of one handler while processing one message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    /// Creates an error with a description only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error caused by `source`.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// User logic invoked once for every message on a bound topic.
#[async_trait]
pub trait Handler
where
    Self: Debug + Send + Sync + 'static,
{
    /// Handles one message.
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

/// Handlers available to stream configuration, keyed by identifier.
///
/// Populated once at startup and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateHandler`] if `id` is already taken.
    pub fn register<H>(&mut self, id: impl Into<String>, handler: H) -> Result<&mut Self, Error>
    where
        H: Handler,
    {
        self.register_shared(id, Arc::new(handler))
    }

    /// Registers an already shared handler under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateHandler`] if `id` is already taken.
    pub fn register_shared(
        &mut self,
        id: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<&mut Self, Error> {
        let id = id.into();
        if self.handlers.contains_key(&id) {
            return Err(Error::DuplicateHandler(id));
        }
        self.handlers.insert(id, handler);
        Ok(self)
    }

    /// Looks up a handler.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(id).cloned()
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    /// Registered identifiers, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
