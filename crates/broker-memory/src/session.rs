use alertstreams_broker::{BrokerSession, Error, Message, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Delivery, MemoryBroker};

/// A session on a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemorySession {
    broker: MemoryBroker,
    closed: bool,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    session_id: u64,
}

impl MemorySession {
    pub(crate) const fn new(
        broker: MemoryBroker,
        session_id: u64,
        receiver: mpsc::UnboundedReceiver<Delivery>,
    ) -> Self {
        Self {
            broker,
            closed: false,
            receiver,
            session_id,
        }
    }
}

#[async_trait]
impl BrokerSession for MemorySession {
    async fn receive(&mut self) -> Result<Option<Message>> {
        if self.closed {
            return Err(Error::connection("memory session is closed"));
        }

        match self.receiver.recv().await {
            Some(Delivery::Message(message)) => Ok(Some(message)),
            Some(Delivery::Severed) => Err(Error::connection(format!(
                "memory session {} was severed",
                self.session_id
            ))),
            None => Ok(None),
        }
    }

    async fn acknowledge(&mut self, message: &Message) -> Result<()> {
        if let Some(sequence) = message.sequence {
            self.broker.record_ack(sequence).await;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.receiver.close();
            self.broker.release(self.session_id).await;
            debug!(session_id = self.session_id, "memory session closed");
        }
        Ok(())
    }
}
