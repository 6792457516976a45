//! Ingest consumer over the in-memory bus

mod common;

use common::{cloud_event, object, t};
use event_bus::{BusMessage, EventBus, InMemoryBus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use timesink_rs::consumer::process_message;
use timesink_rs::metrics::Metrics;
use timesink_rs::repos::{EventLog, InMemoryEventLog};
use timesink_rs::services::Recorder;
use timesink_rs::start_event_consumer;

fn recorder(log: Arc<InMemoryEventLog>) -> Recorder {
    Recorder::new(log, Metrics::new().unwrap(), Duration::from_secs(1))
}

async fn wait_for_rows(log: &InMemoryEventLog, expected: usize) {
    for _ in 0..50 {
        if log.len().await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} rows, found {}", expected, log.len().await);
}

#[tokio::test]
async fn test_consumer_records_published_events_and_skips_bad_ones() {
    let log = Arc::new(InMemoryEventLog::new());
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());

    let handle = start_event_consumer(bus.clone(), recorder(log.clone()), "timesink.events.>")
        .await
        .unwrap();

    let good = serde_json::to_vec(&cloud_event("e1", t(0), object("v1", "Pod", "p1", &[]))).unwrap();
    bus.publish("timesink.events.pods", b"not json".to_vec()).await.unwrap();
    bus.publish("other.subject", good.clone()).await.unwrap();
    bus.publish("timesink.events.pods", good).await.unwrap();

    wait_for_rows(&log, 1).await;
    assert_eq!(log.len().await, 1);
    assert_eq!(log.get_by_id("e1").await.unwrap().unwrap().id, "e1");

    handle.abort();
}

#[tokio::test]
async fn test_binary_mode_message_uses_headers() {
    let log = Arc::new(InMemoryEventLog::new());
    let recorder = recorder(log.clone());

    let headers: HashMap<String, String> = [
        ("ce-specversion", "1.0"),
        ("ce-id", "b1"),
        ("ce-type", "t"),
        ("ce-source", "/bus"),
        ("ce-time", "2024-03-01T12:00:00Z"),
        ("content-type", "application/json"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let msg = BusMessage::new("timesink.events.x".to_string(), br#"{"kind":"Pod"}"#.to_vec())
        .with_headers(headers);

    let stored = process_message(&recorder, &msg).await.unwrap();
    assert_eq!(stored.id, "b1");
    assert_eq!(stored.source, "/bus");
    assert_eq!(log.len().await, 1);
}

#[tokio::test]
async fn test_structured_payload_wins_over_binary_headers() {
    let log = Arc::new(InMemoryEventLog::new());
    let recorder = recorder(log.clone());

    let headers: HashMap<String, String> = [
        ("ce-specversion", "1.0"),
        ("ce-id", "from-headers"),
        ("ce-type", "t"),
        ("ce-source", "/bus"),
        ("ce-time", "2024-03-01T12:00:00Z"),
        ("content-type", "application/json"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let body = serde_json::to_vec(&cloud_event("e7", t(3), object("v1", "Pod", "p7", &[]))).unwrap();
    let msg = BusMessage::new("timesink.events.x".to_string(), body).with_headers(headers);

    let stored = process_message(&recorder, &msg).await.unwrap();
    assert_eq!(stored.id, "e7");
    assert_eq!(stored.time, t(3));
    assert!(log.get_by_id("from-headers").await.unwrap().is_none());
}
