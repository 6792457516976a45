//! Ingest Consumer
//!
//! Feeds events published on the bus to the recorder. A message either carries
//! a structured-mode CloudEvent as its payload, or (when the transport has
//! headers) binary-mode `ce-*` attributes with the data as its payload.
//!
//! A message that fails is logged and dropped; there is no retry and no DLQ.

use event_bus::{BusError, BusMessage, EventBus};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::envelope::Envelope;
use crate::services::{IngestError, Recorder};

/// Record one bus message
pub async fn process_message(recorder: &Recorder, msg: &BusMessage) -> Result<Envelope, IngestError> {
    recorder
        .ingest_http(&msg.http_headers(), msg.payload.clone())
        .await
}

/// Subscribe to `subject` and record every message on a background task.
///
/// The subscription is established before this returns, so messages published
/// afterwards are not missed.
pub async fn start_event_consumer(
    bus: Arc<dyn EventBus>,
    recorder: Recorder,
    subject: &str,
) -> Result<JoinHandle<()>, BusError> {
    let mut stream = bus.subscribe(subject).await?;
    tracing::info!(component = "Recorder", subject = %subject, "Subscribed to ingest subject");

    let subject = subject.to_string();
    let handle = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let span = tracing::info_span!("ingest_message", subject = %msg.subject);

            async {
                if let Err(e) = process_message(&recorder, &msg).await {
                    tracing::warn!(error = %e, "Dropping event from bus");
                }
            }
            .instrument(span)
            .await;
        }

        tracing::warn!(subject = %subject, "Ingest consumer stopped");
    });

    Ok(handle)
}
