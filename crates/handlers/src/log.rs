use alertstreams_broker::Message;
use alertstreams_stream::{Handler, HandlerError};
use async_trait::async_trait;
use tracing::{debug, info};

const PREVIEW_CHARS: usize = 200;

/// Logs each message's topic, size and position.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogHandler;

#[async_trait]
impl Handler for LogHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        let partition = message.sequence.map(|sequence| sequence.partition());
        let offset = message.sequence.map(|sequence| sequence.offset());

        info!(
            topic = %message.topic,
            bytes = message.payload.len(),
            ?partition,
            ?offset,
            "received message"
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            let preview: String = String::from_utf8_lossy(&message.payload)
                .chars()
                .take(PREVIEW_CHARS)
                .collect();
            debug!(topic = %message.topic, %preview, "message payload");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alertstreams_broker::Sequence;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_logs_topic_and_position() {
        let message =
            Message::new("gcn.circular", "GCN Circular 1").with_sequence(Sequence::new(3, 42));

        LogHandler.handle(&message).await.unwrap();

        assert!(logs_contain("gcn.circular"));
        assert!(logs_contain("bytes=14"));
        assert!(logs_contain("offset=Some(42)"));
    }
}
