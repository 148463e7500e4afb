mod common;

use std::sync::Arc;

use alertstreams_broker_memory::{MemoryBroker, MemoryBrokerFactory};
use alertstreams_registry::{BrokerRegistry, Problem, StreamConfig, build};
use alertstreams_stream::HandlerRegistry;
use alertstreams_supervisor::{Supervisor, WorkerOutcome};
use assert_matches::assert_matches;

use common::{Recorder, Seen, policy, wait_for_seen};

fn registries(broker: &MemoryBroker, seen: &Seen) -> (HandlerRegistry, BrokerRegistry) {
    let mut handlers = HandlerRegistry::new();
    handlers
        .register(
            "first",
            Recorder {
                seen: Arc::clone(seen),
            },
        )
        .unwrap()
        .register(
            "second",
            Recorder {
                seen: Arc::clone(seen),
            },
        )
        .unwrap();

    let mut brokers = BrokerRegistry::new();
    brokers
        .register(MemoryBrokerFactory::new(broker.clone()))
        .unwrap();

    (handlers, brokers)
}

#[tokio::test(start_paused = true)]
async fn test_configured_streams_survive_a_dropped_connection() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let broker = MemoryBroker::new();
    let seen = Seen::default();
    let (handlers, brokers) = registries(&broker, &seen);

    let configs = vec![
        StreamConfig::new("alerts", "memory").with_topic("alerts", ["first", "second"]),
        StreamConfig::new("notices", "memory").with_topic("notices", ["first"]),
        StreamConfig::new("parked", "memory")
            .with_topic("parked", ["first"])
            .inactive(),
    ];
    let streams = build(&configs, &handlers, &brokers).unwrap();
    assert_eq!(streams.len(), 2);

    let supervisor = Arc::new(Supervisor::new(policy()));
    let runner = tokio::spawn({
        let supervisor = Arc::clone(&supervisor);
        async move { supervisor.run(streams).await }
    });

    broker.wait_for_sessions(2).await;
    broker.publish("alerts", "a1").await;
    wait_for_seen(&seen, 2).await;

    broker.sever_topic("alerts").await;
    broker.wait_for_sessions(2).await;
    broker.publish("alerts", "a2").await;
    broker.publish("notices", "n1").await;
    wait_for_seen(&seen, 5).await;

    supervisor.shutdown();
    let reports = runner.await.unwrap().unwrap();

    assert!(
        reports
            .iter()
            .all(|report| matches!(report.outcome, WorkerOutcome::Cancelled))
    );
    assert_eq!(broker.connects().await, 3);
    assert_eq!(broker.closed_sessions().await, 3);

    let mut seen = seen.lock().unwrap().clone();
    // Streams are independent, so only the per-stream order is fixed.
    let alerts: Vec<&String> = seen.iter().filter(|s| s.starts_with("alerts:")).collect();
    assert_eq!(alerts, ["alerts:a1", "alerts:a1", "alerts:a2", "alerts:a2"]);
    seen.retain(|s| s.starts_with("notices:"));
    assert_eq!(seen, vec!["notices:n1"]);
}

#[test]
fn test_bad_configuration_never_starts_a_worker() {
    let broker = MemoryBroker::new();
    let seen = Seen::default();
    let (handlers, brokers) = registries(&broker, &seen);

    let configs = vec![
        StreamConfig::new("alerts", "memory").with_topic("alerts", ["first", "missing"]),
        StreamConfig::new("alerts", "memory").with_topic("notices", ["first"]),
    ];

    let error = build(&configs, &handlers, &brokers).unwrap_err();

    assert_matches!(
        error.problems(),
        [
            Problem::UnresolvedHandler { handler, .. },
            Problem::DuplicateStreamId { first: 1, second: 2, .. },
        ] if handler == "missing"
    );
    assert_eq!(broker.live_sessions(), 0);
}
