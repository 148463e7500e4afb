use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use alertstreams_broker::Message;
use futures::FutureExt;
use tracing::{trace, warn};

use crate::{Error, Handler};

/// A handler bound to a topic, remembered with the identifier it was
/// configured under.
#[derive(Clone, Debug)]
pub struct BoundHandler {
    id: String,
    handler: Arc<dyn Handler>,
}

impl BoundHandler {
    /// Binds `handler` under `id`.
    pub fn new(id: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            id: id.into(),
            handler,
        }
    }

    /// The configured handler identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Result of routing one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// No handlers are bound to the message's topic.
    Unrouted,

    /// Every bound handler was invoked.
    Handled {
        /// Handlers that returned successfully.
        succeeded: usize,
        /// Handlers that failed.
        failed: usize,
    },
}

/// Topic to handler-list routing for one stream.
///
/// Handlers run in the order they were bound.
#[derive(Clone, Debug, Default)]
pub struct TopicRoutes {
    routes: HashMap<String, Vec<BoundHandler>>,
    topics: Vec<String>,
}

impl TopicRoutes {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an ordered handler list to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTopic`] if `topic` is already bound.
    pub fn bind(
        &mut self,
        topic: impl Into<String>,
        handlers: Vec<BoundHandler>,
    ) -> Result<&mut Self, Error> {
        let topic = topic.into();
        if self.routes.contains_key(&topic) {
            return Err(Error::DuplicateTopic(topic));
        }
        self.topics.push(topic.clone());
        self.routes.insert(topic, handlers);
        Ok(self)
    }

    /// Handlers bound to `topic`, in invocation order.
    #[must_use]
    pub fn resolve(&self, topic: &str) -> Option<&[BoundHandler]> {
        self.routes.get(topic).map(Vec::as_slice)
    }

    /// Bound topics, in binding order.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Whether no topic is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Invokes every handler bound to the message's topic, sequentially.
    ///
    /// A failing or panicking handler is logged and does not prevent later
    /// handlers from running.
    pub async fn dispatch(&self, stream_id: &str, message: &Message) -> Dispatch {
        let Some(handlers) = self.resolve(&message.topic) else {
            warn!(
                stream_id,
                topic = %message.topic,
                "received message on a topic with no handlers"
            );
            return Dispatch::Unrouted;
        };

        let mut succeeded = 0;
        let mut failed = 0;
        for bound in handlers {
            let outcome = AssertUnwindSafe(bound.handler.handle(message))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {
                    trace!(
                        stream_id,
                        topic = %message.topic,
                        handler = bound.id(),
                        "handled"
                    );
                    succeeded += 1;
                }
                Ok(Err(e)) => {
                    warn!(
                        stream_id,
                        topic = %message.topic,
                        handler = bound.id(),
                        error = %e,
                        "handler failed"
                    );
                    failed += 1;
                }
                Err(panic) => {
                    warn!(
                        stream_id,
                        topic = %message.topic,
                        handler = bound.id(),
                        panic = panic_message(panic.as_ref()),
                        "handler panicked"
                    );
                    failed += 1;
                }
            }
        }

        Dispatch::Handled { succeeded, failed }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use tracing_test::traced_test;

    use crate::HandlerError;

    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        fail: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Handler for Recorder {
        async fn handle(&self, _message: &Message) -> Result<(), HandlerError> {
            self.calls.lock().unwrap().push(self.name);
            if self.fail {
                Err(HandlerError::new("boom"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Debug)]
    struct Panicker;

    #[async_trait]
    impl Handler for Panicker {
        async fn handle(&self, _message: &Message) -> Result<(), HandlerError> {
            panic!("handler bug");
        }
    }

    fn bound(name: &'static str, fail: bool, calls: &Arc<Mutex<Vec<&'static str>>>) -> BoundHandler {
        BoundHandler::new(
            name,
            Arc::new(Recorder {
                name,
                fail,
                calls: Arc::clone(calls),
            }),
        )
    }

    #[tokio::test]
    async fn test_handlers_run_in_binding_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut routes = TopicRoutes::new();
        routes
            .bind("alerts", vec![bound("h1", false, &calls), bound("h2", false, &calls)])
            .unwrap();

        let outcome = routes
            .dispatch("s", &Message::new("alerts", "payload"))
            .await;

        assert_eq!(outcome, Dispatch::Handled { succeeded: 2, failed: 0 });
        assert_eq!(*calls.lock().unwrap(), vec!["h1", "h2"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failing_handler_does_not_stop_the_rest() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut routes = TopicRoutes::new();
        routes
            .bind("alerts", vec![bound("h1", true, &calls), bound("h2", false, &calls)])
            .unwrap();

        let outcome = routes
            .dispatch("s", &Message::new("alerts", "payload"))
            .await;

        assert_eq!(outcome, Dispatch::Handled { succeeded: 1, failed: 1 });
        assert_eq!(*calls.lock().unwrap(), vec!["h1", "h2"]);
        assert!(logs_contain("handler failed"));
        assert!(logs_contain("h1"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_panicking_handler_counts_as_failure() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut routes = TopicRoutes::new();
        routes
            .bind(
                "alerts",
                vec![
                    BoundHandler::new("h1", Arc::new(Panicker)),
                    bound("h2", false, &calls),
                ],
            )
            .unwrap();

        let outcome = routes
            .dispatch("s", &Message::new("alerts", "payload"))
            .await;

        assert_eq!(outcome, Dispatch::Handled { succeeded: 1, failed: 1 });
        assert_eq!(*calls.lock().unwrap(), vec!["h2"]);
        assert!(logs_contain("handler panicked"));
        assert!(logs_contain("handler bug"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unrouted_topic_is_logged() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut routes = TopicRoutes::new();
        routes.bind("alerts", vec![bound("h1", false, &calls)]).unwrap();

        let outcome = routes
            .dispatch("s", &Message::new("elsewhere", "payload"))
            .await;

        assert_eq!(outcome, Dispatch::Unrouted);
        assert!(calls.lock().unwrap().is_empty());
        assert!(logs_contain("no handlers"));
        assert!(logs_contain("elsewhere"));
    }

    #[test]
    fn test_topics_keep_binding_order() {
        let mut routes = TopicRoutes::new();
        routes
            .bind("b", Vec::new())
            .unwrap()
            .bind("a", Vec::new())
            .unwrap();

        assert_eq!(routes.topics(), ["b".to_string(), "a".to_string()]);
        assert_matches!(routes.bind("a", Vec::new()), Err(Error::DuplicateTopic(topic)) if topic == "a");
    }

    #[tokio::test]
    async fn test_topic_without_handlers_is_routed() {
        let mut routes = TopicRoutes::new();
        routes.bind("quiet", Vec::new()).unwrap();

        let outcome = routes.dispatch("s", &Message::new("quiet", "payload")).await;

        assert_eq!(outcome, Dispatch::Handled { succeeded: 0, failed: 0 });
    }
}
