use std::sync::Arc;

use alertstreams_broker::{BrokerSession, Error, Message, Result, Sequence};
use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers as _, Message as _};
use tracing::debug;

/// A subscribed Kafka consumer.
pub struct KafkaSession {
    closed: bool,
    consumer: Arc<StreamConsumer>,
}

impl std::fmt::Debug for KafkaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSession")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl KafkaSession {
    pub(crate) const fn new(consumer: Arc<StreamConsumer>) -> Self {
        Self {
            closed: false,
            consumer,
        }
    }
}

#[async_trait]
impl BrokerSession for KafkaSession {
    async fn receive(&mut self) -> Result<Option<Message>> {
        if self.closed {
            return Err(Error::connection("kafka session is closed"));
        }

        let received = self.consumer.recv().await.map_err(Error::connection)?;

        let payload = received
            .payload()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default();

        let mut message = Message::new(received.topic(), payload)
            .with_sequence(Sequence::new(received.partition(), received.offset()));

        if let Some(headers) = received.headers() {
            message = message.with_headers(
                headers
                    .iter()
                    .map(|header| {
                        let value = header
                            .value
                            .map(|v| String::from_utf8_lossy(v).into_owned())
                            .unwrap_or_default();
                        (header.key.to_string(), value)
                    })
                    .collect(),
            );
        }

        Ok(Some(message))
    }

    async fn acknowledge(&mut self, message: &Message) -> Result<()> {
        if let Some(sequence) = message.sequence {
            // The stored offset is the next one to read.
            self.consumer
                .store_offset(&message.topic, sequence.partition(), sequence.offset() + 1)
                .map_err(Error::connection)?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Async) {
            debug!(error = %e, "nothing committed on close");
        }
        self.consumer.unsubscribe();

        Ok(())
    }
}
