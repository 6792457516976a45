//! # CloudEvents Envelope
//!
//! Decoding and validation of CloudEvents as they arrive from producers, on top
//! of the `cloudevents` SDK.
//!
//! ## Modes
//!
//! - **Structured**: the whole event is one JSON object. A body that is a JSON
//!   object carrying `specversion` is always read this way, whatever headers
//!   came with it.
//! - **Binary**: attributes travel as `ce-*` headers and the body is the `data`.
//!
//! ## Rules on top of the SDK
//!
//! - `time` is required (optional in CloudEvents, but every downstream ordering
//!   decision is made on it)
//! - `id`, `type`, `source` must be non-empty
//! - `data` must be JSON; a binary body is parsed and stored as JSON data

use chrono::{DateTime, Utc};
use cloudevents::binding::http::to_event;
use cloudevents::{AttributesReader, Data, Event, EventBuilder, EventBuilderV10};
use http::HeaderMap;
use serde_json::Value;

/// Content type of a structured-mode JSON event
pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

/// Content type recorded for JSON data
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors produced while decoding or validating an envelope
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("missing required attribute: {0}")]
    MissingField(&'static str),

    #[error("invalid attribute '{name}': {reason}")]
    InvalidField { name: String, reason: String },
}

/// Build a 1.0 event with JSON data (mostly useful for producers and tests)
pub fn new_event(
    id: impl Into<String>,
    event_type: impl Into<String>,
    source: impl Into<String>,
    time: DateTime<Utc>,
    data: Value,
) -> Result<Event, EnvelopeError> {
    let event = EventBuilderV10::new()
        .id(id)
        .ty(event_type)
        .source(source)
        .time(time)
        .data(JSON_CONTENT_TYPE, data)
        .build()
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    validate(&event)?;
    Ok(event)
}

/// Decode a structured-mode event
///
/// # Errors
///
/// Returns `EnvelopeError::Malformed` for bytes the SDK cannot read as an event
/// and the relevant field error when a required attribute is absent or invalid.
pub fn decode_structured(bytes: &[u8]) -> Result<Event, EnvelopeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    decode_value(value)
}

/// Decode a structured-mode event that has already been parsed as JSON
pub fn decode_value(value: Value) -> Result<Event, EnvelopeError> {
    if !value.is_object() {
        return Err(EnvelopeError::Malformed(
            "envelope must be a JSON object".to_string(),
        ));
    }

    let event: Event =
        serde_json::from_value(value).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    finish(event)
}

/// Decode an event delivered over HTTP (or any transport with HTTP-style headers)
pub fn decode_http(headers: &HeaderMap, body: Vec<u8>) -> Result<Event, EnvelopeError> {
    if let Some(value) = structured_body(&body) {
        return decode_value(value);
    }

    let event = to_event(headers, body).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    finish(event)
}

/// Check the attributes this platform requires beyond the SDK's own checks
pub fn validate(event: &Event) -> Result<(), EnvelopeError> {
    require_non_empty("id", event.id())?;
    require_non_empty("type", event.ty())?;
    require_non_empty("source", &event.source().to_string())?;

    if event.time().is_none() {
        return Err(EnvelopeError::MissingField("time"));
    }
    Ok(())
}

/// Canonical structured-mode serialization
pub fn encode(event: &Event) -> Result<Vec<u8>, EnvelopeError> {
    serde_json::to_vec(event).map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

/// The event's data as JSON; an event without data reads as `null`
pub fn json_data(event: &Event) -> Result<Value, EnvelopeError> {
    match event.data() {
        None => Ok(Value::Null),
        Some(Data::Json(value)) => Ok(value.clone()),
        Some(Data::String(text)) => Ok(Value::String(text.clone())),
        Some(Data::Binary(bytes)) => parse_json_data(bytes),
    }
}

fn structured_body(body: &[u8]) -> Option<Value> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .filter(|value| value.get("specversion").is_some())
}

fn finish(event: Event) -> Result<Event, EnvelopeError> {
    let event = with_json_data(event)?;
    validate(&event)?;
    Ok(event)
}

/// Replace binary data with the JSON it encodes
fn with_json_data(mut event: Event) -> Result<Event, EnvelopeError> {
    let parsed = match event.data() {
        Some(Data::Binary(bytes)) => Some(parse_json_data(bytes)?),
        _ => None,
    };

    if let Some(value) = parsed {
        event.set_data(JSON_CONTENT_TYPE, value);
    }
    Ok(event)
}

fn parse_json_data(bytes: &[u8]) -> Result<Value, EnvelopeError> {
    serde_json::from_slice(bytes).map_err(|e| EnvelopeError::InvalidField {
        name: "data".to_string(),
        reason: format!("only JSON payloads are stored: {}", e),
    })
}

fn require_non_empty(name: &'static str, value: &str) -> Result<(), EnvelopeError> {
    if value.trim().is_empty() {
        return Err(EnvelopeError::InvalidField {
            name: name.to_string(),
            reason: "must be non-empty".to_string(),
        });
    }
    Ok(())
}
