//! Common test utilities for timesink tests
//!
//! Everything here runs against `InMemoryEventLog`; Postgres tests set up their
//! own pool in `pg_event_log_test.rs`.

#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tower::ServiceExt;

use timesink_rs::config::ServiceRole;
use timesink_rs::envelope::Envelope;
use timesink_rs::identity::MatchPolicy;
use timesink_rs::metrics::Metrics;
use timesink_rs::repos::{EventLog, InMemoryEventLog};
use timesink_rs::{build_router, AppState};

pub const MAX_DEPTH: usize = 8;

/// Fixed base time; `t(n)` is `n` minutes after it
pub fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub fn state_with(log: Arc<InMemoryEventLog>, role: ServiceRole, policy: MatchPolicy) -> Arc<AppState> {
    Arc::new(AppState::new(
        log,
        Metrics::new().unwrap(),
        role,
        policy,
        MAX_DEPTH,
        StdDuration::from_secs(2),
    ))
}

pub fn app(log: Arc<InMemoryEventLog>) -> Router {
    build_router(state_with(log, ServiceRole::All, MatchPolicy::Exact), ServiceRole::All)
}

/// Structured-mode CloudEvent JSON
pub fn cloud_event(id: &str, time: DateTime<Utc>, data: Value) -> Value {
    json!({
        "specversion": "1.0",
        "id": id,
        "type": "io.k8s.resource.updated",
        "source": "/apis/watch",
        "time": time.to_rfc3339(),
        "data": data
    })
}

/// Kubernetes-style object payload
pub fn object(api_version: &str, kind: &str, name: &str, owners: &[(&str, &str, &str)]) -> Value {
    let mut metadata = json!({"name": name, "uid": format!("uid-{}-{}", kind.to_lowercase(), name)});
    if !owners.is_empty() {
        metadata["ownerReferences"] = owners
            .iter()
            .map(|(a, k, n)| json!({"apiVersion": a, "kind": k, "name": n}))
            .collect();
    }
    json!({"apiVersion": api_version, "kind": kind, "metadata": metadata})
}

pub async fn seed(log: &InMemoryEventLog, id: &str, time: DateTime<Utc>, data: Value) -> Envelope {
    let event = event_bus::decode_value(cloud_event(id, time, data)).unwrap();
    let envelope = Envelope::from_cloud_event(event).unwrap();
    log.append(&envelope).await.unwrap();
    envelope
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: &Router, uri: &str, content_type: &str, body: &Value) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
    )
    .await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
