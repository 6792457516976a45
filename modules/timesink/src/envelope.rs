//! Stored event envelope
//!
//! An `Envelope` is the parsed form of one log row. The canonical serialized
//! CloudEvent is kept alongside the parsed attributes so that what was stored is
//! exactly what is served back.
//!
//! Identity queries on Postgres cast every stored row to `jsonb`, which cannot
//! hold a NUL character. An event carrying one anywhere (attributes, extension
//! values, payload keys or strings) is rejected here, before it can reach the
//! log and break every later query.

use chrono::{DateTime, Utc};
use event_bus::{AttributesReader, CloudEvent, EnvelopeError};
use serde_json::Value;

use crate::identity::ObjectIdentity;
use crate::payload::{FieldError, Payload};

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: String,
    pub event_type: String,
    pub source: String,
    pub subject: Option<String>,
    pub time: DateTime<Utc>,
    pub payload: Payload,
    raw: Vec<u8>,
}

impl Envelope {
    /// Build an envelope from a decoded event, serializing it canonically
    pub fn from_cloud_event(event: CloudEvent) -> Result<Self, EnvelopeError> {
        event_bus::validate(&event)?;
        let raw = event_bus::encode(&event)?;
        reject_nul(&raw)?;
        Self::assemble(&event, raw)
    }

    /// Decode an envelope from its stored canonical bytes
    pub fn from_raw(raw: Vec<u8>) -> Result<Self, EnvelopeError> {
        let event = event_bus::decode_structured(&raw)?;
        Self::assemble(&event, raw)
    }

    fn assemble(event: &CloudEvent, raw: Vec<u8>) -> Result<Self, EnvelopeError> {
        let time = *event.time().ok_or(EnvelopeError::MissingField("time"))?;
        Ok(Self {
            id: event.id().to_string(),
            event_type: event.ty().to_string(),
            source: event.source().to_string(),
            subject: event.subject().map(str::to_string),
            time,
            payload: Payload::new(event_bus::json_data(event)?),
            raw,
        })
    }

    /// Canonical structured-mode bytes, as persisted
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn identity(&self) -> Result<ObjectIdentity, FieldError> {
        self.payload.identity()
    }

    pub fn uid(&self) -> Option<&str> {
        self.payload.uid()
    }

    pub fn owner_references(&self) -> Vec<ObjectIdentity> {
        self.payload.owner_references()
    }
}

fn reject_nul(raw: &[u8]) -> Result<(), EnvelopeError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    match nul_path(&value, "") {
        Some(path) => Err(EnvelopeError::InvalidField {
            name: path,
            reason: "NUL characters cannot be stored".to_string(),
        }),
        None => Ok(()),
    }
}

/// Dotted path of the first key or string containing U+0000
fn nul_path(value: &Value, path: &str) -> Option<String> {
    let join = |segment: &str| {
        if path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", path, segment)
        }
    };

    match value {
        Value::String(s) if s.contains('\0') => Some(path.to_string()),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, item)| nul_path(item, &join(&i.to_string()))),
        Value::Object(map) => map.iter().find_map(|(key, item)| {
            if key.contains('\0') {
                Some(join(&key.replace('\0', "\\u0000")))
            } else {
                nul_path(item, &join(key))
            }
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use event_bus::{new_event, AttributesWriter};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_raw_round_trip_preserves_nested_payload() {
        let data = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cm1", "annotations": {"a/b": "c"}},
            "data": {"nested": [1, 2.5, {"deep": [true, null, "x"]}]}
        });
        let mut event = new_event(
            "e1",
            "io.k8s.configmap.updated",
            "/clusters/dev",
            t0(),
            data.clone(),
        )
        .unwrap();
        event.set_subject(Some("configmaps/cm1"));

        let stored = Envelope::from_cloud_event(event).unwrap();
        let loaded = Envelope::from_raw(stored.raw().to_vec()).unwrap();

        assert_eq!(loaded, stored);
        assert_eq!(loaded.payload.as_value(), &data);
        assert_eq!(loaded.subject.as_deref(), Some("configmaps/cm1"));
    }

    #[test]
    fn test_event_without_data_has_null_payload() {
        let mut event = new_event("e2", "ping", "/health", t0(), json!(null)).unwrap();
        event.take_data();

        let envelope = Envelope::from_cloud_event(event).unwrap();
        assert!(envelope.payload.as_value().is_null());
        assert!(envelope.identity().is_err());
        assert!(envelope.owner_references().is_empty());
    }

    #[test]
    fn test_nul_in_payload_is_rejected() {
        let event = new_event(
            "e3",
            "t",
            "/dev",
            t0(),
            json!({"kind": "Pod", "metadata": {"annotations": {"note": "a\u{0}b"}}}),
        )
        .unwrap();

        assert_eq!(
            Envelope::from_cloud_event(event),
            Err(EnvelopeError::InvalidField {
                name: "data.metadata.annotations.note".to_string(),
                reason: "NUL characters cannot be stored".to_string(),
            })
        );
    }

    #[test]
    fn test_nul_in_attribute_or_key_is_rejected() {
        let mut event = new_event("e4", "t", "/dev", t0(), json!({"kind": "Pod"})).unwrap();
        event.set_subject(Some("pods/\u{0}"));
        assert!(matches!(
            Envelope::from_cloud_event(event),
            Err(EnvelopeError::InvalidField { ref name, .. }) if name == "subject"
        ));

        let event = new_event("e5", "t", "/dev", t0(), json!({"a\u{0}": 1})).unwrap();
        assert!(Envelope::from_cloud_event(event).is_err());
    }

    #[test]
    fn test_escaped_backslash_is_not_nul() {
        let event = new_event("e6", "t", "/dev", t0(), json!({"path": "C:\\u0000"})).unwrap();
        assert!(Envelope::from_cloud_event(event).is_ok());
    }
}
