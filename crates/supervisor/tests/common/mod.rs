#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alertstreams_broker::{Broker, BrokerSession, Error as BrokerError, Message, Result as BrokerResult};
use alertstreams_stream::{BoundHandler, Handler, HandlerError, Stream, TopicRoutes};
use alertstreams_supervisor::{BackoffPolicy, WorkerEvent};
use async_trait::async_trait;
use tokio::sync::broadcast;

pub type Seen = Arc<Mutex<Vec<String>>>;

/// Records `topic:payload` for every message.
#[derive(Debug)]
pub struct Recorder {
    pub seen: Seen,
}

#[async_trait]
impl Handler for Recorder {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        let payload = String::from_utf8_lossy(&message.payload).into_owned();
        self.seen
            .lock()
            .unwrap()
            .push(format!("{}:{payload}", message.topic));
        Ok(())
    }
}

/// Panics on every message.
#[derive(Debug)]
pub struct Panicker;

#[async_trait]
impl Handler for Panicker {
    async fn handle(&self, _message: &Message) -> Result<(), HandlerError> {
        panic!("handler bug");
    }
}

/// Rejects every connection as misconfigured.
#[derive(Debug)]
pub struct Misconfigured;

#[async_trait]
impl Broker for Misconfigured {
    async fn connect(&self, _topics: &[String]) -> BrokerResult<Box<dyn BrokerSession>> {
        Err(BrokerError::Configuration(
            "credentials rejected".to_string(),
        ))
    }
}

pub fn policy() -> BackoffPolicy {
    BackoffPolicy {
        initial: Duration::from_millis(100),
        max: Duration::from_secs(1),
        reset_after: Duration::from_secs(10),
        ..BackoffPolicy::default()
    }
}

pub fn stream<B: Broker>(id: &str, broker: B, seen: &Seen) -> Stream {
    let mut routes = TopicRoutes::new();
    routes
        .bind(
            "alerts",
            vec![BoundHandler::new(
                "recorder",
                Arc::new(Recorder {
                    seen: Arc::clone(seen),
                }),
            )],
        )
        .unwrap();
    Stream::new(id, "memory", Box::new(broker), routes)
}

pub async fn wait_for_seen(seen: &Seen, count: usize) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while seen.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("messages were not handled in time");
}

pub fn drain(events: &mut broadcast::Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub fn retries(events: &[WorkerEvent], id: &str) -> Vec<(u32, Duration)> {
    events
        .iter()
        .filter_map(|event| match event {
            WorkerEvent::RetryScheduled {
                stream_id,
                attempt,
                delay,
                ..
            } if stream_id == id => Some((*attempt, *delay)),
            _ => None,
        })
        .collect()
}
