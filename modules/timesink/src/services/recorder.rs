//! Recorder: validates incoming events and appends them to the log
//!
//! One call, one row. There is no retry and no dead-letter store: an event that
//! fails validation or storage is logged and dropped, and redelivery is up to
//! the producer. Re-posting an id appends another row.

use axum::http::HeaderMap;
use event_bus::{AttributesReader, CloudEvent, EnvelopeError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::metrics::Metrics;
use crate::repos::{bounded, Deadline, EventLog, StorageError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation error: {0}")]
    Validation(#[from] EnvelopeError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Clone)]
pub struct Recorder {
    log: Arc<dyn EventLog>,
    metrics: Metrics,
    write_timeout: Duration,
}

impl Recorder {
    pub fn new(log: Arc<dyn EventLog>, metrics: Metrics, write_timeout: Duration) -> Self {
        Self {
            log,
            metrics,
            write_timeout,
        }
    }

    /// Decode a structured-mode event and record it
    pub async fn ingest(&self, raw: &[u8]) -> Result<Envelope, IngestError> {
        let event = self.decoded(event_bus::decode_structured(raw))?;
        self.ingest_event(event).await
    }

    /// Decode an event delivered with HTTP-style headers and record it
    ///
    /// A JSON body carrying `specversion` is read as structured mode; anything
    /// else is binary mode, with attributes taken from the `ce-*` headers.
    pub async fn ingest_http(
        &self,
        headers: &HeaderMap,
        body: Vec<u8>,
    ) -> Result<Envelope, IngestError> {
        let event = self.decoded(event_bus::decode_http(headers, body))?;
        self.ingest_event(event).await
    }

    fn decoded(
        &self,
        result: Result<CloudEvent, EnvelopeError>,
    ) -> Result<CloudEvent, IngestError> {
        result.map_err(|e| {
            tracing::error!(component = "Recorder", error = %e, "validation error");
            self.metrics.record_ingest("invalid");
            e.into()
        })
    }

    /// Record an event decoded by a transport (binary mode, bus headers, ...)
    pub async fn ingest_event(&self, event: CloudEvent) -> Result<Envelope, IngestError> {
        let id = event.id().to_string();
        tracing::info!(component = "Recorder", id = %id, at = "start", "recording event");

        let result = self.store(event).await;

        match &result {
            Ok(_) => self.metrics.record_ingest("stored"),
            Err(IngestError::Validation(e)) => {
                tracing::error!(component = "Recorder", id = %id, error = %e, "validation error");
                self.metrics.record_ingest("invalid");
            }
            Err(IngestError::Storage(e)) => {
                tracing::error!(component = "Recorder", id = %id, error = %e, "db insert error");
                self.metrics.record_ingest("storage_error");
            }
        }

        tracing::info!(component = "Recorder", id = %id, at = "finish", "recording event");
        result
    }

    async fn store(&self, event: CloudEvent) -> Result<Envelope, IngestError> {
        // Stored bytes are our canonical serialization, never the producer's
        let envelope = Envelope::from_cloud_event(event)?;
        bounded(
            Deadline::after(self.write_timeout),
            self.log.append(&envelope),
        )
        .await?;
        Ok(envelope)
    }
}
