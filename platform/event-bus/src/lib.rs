//! # Event Transport
//!
//! Transport-side building blocks shared by the services in this workspace:
//!
//! - [`CloudEvent`] decoding (structured and binary mode, via the `cloudevents`
//!   SDK) with the validation every ingestion path runs before an event is accepted
//! - [`EventBus`]: publish/subscribe abstraction over a message broker
//!
//! ## Implementations
//!
//! - **NatsBus**: production implementation backed by a NATS server
//! - **InMemoryBus**: dev/test implementation using tokio broadcast channels
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{decode_structured, encode, new_event, AttributesReader, EventBus, InMemoryBus};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = InMemoryBus::new();
//! let mut stream = bus.subscribe("timesink.events.>").await?;
//!
//! let event = new_event(
//!     "e1",
//!     "io.k8s.pod.created",
//!     "/clusters/dev",
//!     chrono::Utc::now(),
//!     serde_json::json!({"kind": "Pod"}),
//! )?;
//! bus.publish("timesink.events.pod", encode(&event)?).await?;
//!
//! if let Some(msg) = stream.next().await {
//!     let decoded = decode_structured(&msg.payload)?;
//!     assert_eq!(decoded.id(), "e1");
//! }
//! # Ok(())
//! # }
//! ```

mod envelope;
mod inmemory_bus;
mod nats_bus;

pub use cloudevents::{AttributesReader, AttributesWriter, Data, Event as CloudEvent};
pub use envelope::{
    decode_http, decode_structured, decode_value, encode, json_data, new_event, validate,
    EnvelopeError, JSON_CONTENT_TYPE, STRUCTURED_CONTENT_TYPE,
};
pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::fmt;

/// A message received from the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject this message was published to
    pub subject: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
    /// Broker headers, when the transport carries them
    pub headers: Option<HashMap<String, String>>,
}

impl BusMessage {
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self {
            subject,
            payload,
            headers: None,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Broker headers as an HTTP header map; entries that are not valid HTTP
    /// headers are skipped
    pub fn http_headers(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in self.headers.iter().flatten() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => tracing::debug!(header = %name, "skipping non-HTTP header"),
            }
        }
        map
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to subject: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// Publish/subscribe abstraction
///
/// Subjects are dot-separated tokens; subscriptions accept NATS wildcards
/// (`*` for one token, `>` for the remainder).
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_headers_skip_invalid_entries() {
        let headers: HashMap<String, String> = [
            ("ce-id", "e1"),
            ("Content-Type", "application/json"),
            ("bad header", "x"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let map = BusMessage::new("s".to_string(), Vec::new())
            .with_headers(headers)
            .http_headers();

        assert_eq!(map.len(), 2);
        assert_eq!(map["ce-id"], "e1");
        assert_eq!(map["content-type"], "application/json");
        assert!(BusMessage::new("s".to_string(), Vec::new())
            .http_headers()
            .is_empty());
    }
}
