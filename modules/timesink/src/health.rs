use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::app::AppState;
use crate::repos::{bounded, Deadline};

/// Health check endpoint handler
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "timesink-rs",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness: the event log answers a ping
pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match bounded(Deadline::after(Duration::from_secs(2)), state.log.ping()).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ready"}))),
        Err(e) => {
            tracing::warn!(error = %e, "event log not ready");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "error": e.to_string()})),
            )
        }
    }
}
