use alertstreams_broker::Message;
use alertstreams_stream::{Handler, HandlerError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, trace};

const DEFAULT_EVERY: u64 = 1000;

/// A broker heartbeat.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Heartbeat {
    /// Microseconds since the Unix epoch.
    pub timestamp: i64,

    /// Beat counter.
    pub count: u64,

    /// Any other fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Heartbeat {
    /// Decodes a heartbeat, unwrapping a `{"format": ..., "content": {...}}`
    /// envelope if present.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] if the payload is not a heartbeat.
    pub fn decode(payload: &[u8]) -> Result<Self, HandlerError> {
        let mut value: Value = serde_json::from_slice(payload)
            .map_err(|e| HandlerError::with_source("heartbeat is not valid JSON", e))?;

        if let Some(content) = value
            .as_object_mut()
            .filter(|object| object.contains_key("format"))
            .and_then(|object| object.remove("content"))
        {
            value = content;
        }

        serde_json::from_value(value)
            .map_err(|e| HandlerError::with_source("malformed heartbeat", e))
    }

    /// The beat time.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] if the timestamp is out of range.
    pub fn time(&self) -> Result<DateTime<Utc>, HandlerError> {
        DateTime::from_timestamp_micros(self.timestamp).ok_or_else(|| {
            HandlerError::new(format!(
                "heartbeat timestamp {} is out of range",
                self.timestamp
            ))
        })
    }
}

/// Logs every N-th heartbeat.
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatHandler {
    every: u64,
}

impl Default for HeartbeatHandler {
    fn default() -> Self {
        Self::new(DEFAULT_EVERY)
    }
}

impl HeartbeatHandler {
    /// Logs beats whose count is a multiple of `every` (at least 1).
    #[must_use]
    pub const fn new(every: u64) -> Self {
        Self {
            every: if every == 0 { 1 } else { every },
        }
    }
}

#[async_trait]
impl Handler for HeartbeatHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        let heartbeat = Heartbeat::decode(&message.payload)?;
        let time = heartbeat.time()?;

        if heartbeat.count % self.every == 0 {
            let extra = Value::Object(heartbeat.extra);
            info!(
                topic = %message.topic,
                time = %time.to_rfc3339_opts(SecondsFormat::Micros, true),
                count = heartbeat.count,
                %extra,
                "heartbeat"
            );
        } else {
            trace!(topic = %message.topic, count = heartbeat.count, "heartbeat");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use tracing_test::traced_test;

    fn beat(payload: &'static str) -> Message {
        Message::new("sys.heartbeat", payload)
    }

    #[test]
    fn test_decodes_plain_and_enveloped_beats() {
        let plain = Heartbeat::decode(br#"{"timestamp": 1700000000000000, "count": 7, "beat": "LUB"}"#)
            .unwrap();
        assert_eq!(plain.count, 7);
        assert_eq!(plain.extra["beat"], "LUB");
        assert_eq!(
            plain.time().unwrap().to_rfc3339_opts(SecondsFormat::Secs, true),
            "2023-11-14T22:13:20Z"
        );

        let enveloped = Heartbeat::decode(
            br#"{"format": "json", "content": {"timestamp": 1700000000000000, "count": 7, "beat": "LUB"}}"#,
        )
        .unwrap();
        assert_eq!(enveloped, plain);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logs_every_nth_beat() {
        let handler = HeartbeatHandler::new(1000);

        handler
            .handle(&beat(r#"{"timestamp": 1700000000000000, "count": 999}"#))
            .await
            .unwrap();

        handler
            .handle(&beat(r#"{"timestamp": 1700000000000000, "count": 2000}"#))
            .await
            .unwrap();
        assert!(logs_contain("count=2000"));
        assert!(logs_contain("2023-11-14T22:13:20.000000Z"));
        logs_assert(|lines: &[&str]| {
            let info: Vec<&&str> = lines
                .iter()
                .filter(|line| line.contains(" INFO "))
                .collect();
            match info.as_slice() {
                [line] if line.contains("count=2000") => Ok(()),
                other => Err(format!("expected one info heartbeat, got {other:?}")),
            }
        });
    }

    #[tokio::test]
    async fn test_malformed_beats_are_handler_errors() {
        let handler = HeartbeatHandler::default();

        assert_matches!(handler.handle(&beat("not json")).await, Err(e) => {
            assert_eq!(e.to_string(), "heartbeat is not valid JSON");
        });
        assert_matches!(handler.handle(&beat(r#"{"count": 1}"#)).await, Err(e) => {
            assert_eq!(e.to_string(), "malformed heartbeat");
        });
        assert_matches!(
            handler
                .handle(&beat(r#"{"timestamp": 9223372036854775807, "count": 1}"#))
                .await,
            Err(e) if e.to_string().contains("out of range")
        );
    }

    #[test]
    fn test_zero_interval_logs_every_beat() {
        assert_eq!(HeartbeatHandler::new(0).every, 1);
    }
}
