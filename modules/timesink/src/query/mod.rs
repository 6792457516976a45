pub mod schema;
pub mod surface;

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::Value;

use crate::envelope::Envelope;

pub use schema::{build_schema, EventNode, QueryRoot, TimesinkSchema};
pub use surface::QuerySurface;

/// Scalar fields of an event as served over REST
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub subject: Option<String>,
    pub time: String,
    pub data: Value,
}

impl From<&Envelope> for EventView {
    fn from(envelope: &Envelope) -> Self {
        Self {
            id: envelope.id.clone(),
            event_type: envelope.event_type.clone(),
            source: envelope.source.clone(),
            subject: envelope.subject.clone(),
            time: envelope.time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            data: envelope.payload.as_value().clone(),
        }
    }
}
