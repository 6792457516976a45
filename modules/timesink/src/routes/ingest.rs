//! CloudEvents HTTP receiver
//!
//! Structured mode carries the whole event as a JSON body; binary mode carries
//! attributes in `ce-*` headers and the payload as the body. A JSON body that
//! carries `specversion` is always structured, whatever headers came with it.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::SecondsFormat;
use serde::Serialize;
use std::sync::Arc;

use super::ApiError;
use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: String,
    pub time: String,
}

/// Handler for POST / and POST /api/events
///
/// Returns 202 once the event is stored, 400 when it fails validation and
/// 500 (504 on timeout) when it could not be stored. Failed events are dropped.
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let recorder = state
        .recorder
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "recording is disabled"))?;

    let stored = recorder.ingest_http(&headers, body.to_vec()).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            id: stored.id.clone(),
            time: stored.time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }),
    ))
}
