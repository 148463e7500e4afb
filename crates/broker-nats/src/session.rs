use alertstreams_broker::{BrokerSession, Message, Result};
use async_nats::{Client, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::SelectAll;
use tracing::{debug, warn};

/// A NATS connection plus its subject subscriptions.
#[derive(Debug)]
pub struct NatsSession {
    client: Client,
    subscriptions: Option<SelectAll<Subscriber>>,
}

impl NatsSession {
    pub(crate) const fn new(client: Client, subscriptions: SelectAll<Subscriber>) -> Self {
        Self {
            client,
            subscriptions: Some(subscriptions),
        }
    }
}

#[async_trait]
impl BrokerSession for NatsSession {
    async fn receive(&mut self) -> Result<Option<Message>> {
        let Some(subscriptions) = self.subscriptions.as_mut() else {
            return Ok(None);
        };

        // Subscriptions survive the client's own reconnects, so they only end
        // once the connection is gone for good.
        Ok(subscriptions
            .next()
            .await
            .map(|message| Message::new(message.subject.to_string(), message.payload)))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut subscriptions) = self.subscriptions.take() {
            for subscriber in subscriptions.iter_mut() {
                if let Err(e) = subscriber.unsubscribe().await {
                    debug!(error = %e, "failed to unsubscribe");
                }
            }

            if let Err(e) = self.client.flush().await {
                warn!(error = %e, "failed to flush nats client on close");
            }
        }

        Ok(())
    }
}
