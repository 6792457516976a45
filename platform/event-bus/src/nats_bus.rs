//! NATS-backed EventBus

use crate::{BusError, BusMessage, BusResult, EventBus};
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;

/// EventBus over a core NATS connection
///
/// Message headers are carried through so that binary-mode CloudEvents
/// (`ce-*` headers, data in the payload) can be decoded by consumers.
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect to a NATS server and wrap the client
    pub async fn connect(url: &str) -> BusResult<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::ConnectionError(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))
    }

    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let stream = subscriber.map(|nats_msg| {
            let msg = BusMessage::new(nats_msg.subject.to_string(), nats_msg.payload.to_vec());

            match nats_msg.headers {
                Some(nats_headers) => {
                    let headers: HashMap<String, String> = nats_headers
                        .iter()
                        .filter_map(|(key, values)| {
                            values.first().map(|v| (key.to_string(), v.to_string()))
                        })
                        .collect();
                    if headers.is_empty() {
                        msg
                    } else {
                        msg.with_headers(headers)
                    }
                }
                None => msg,
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs a broker: docker run -p 4222:4222 nats:2.10-alpine
    #[tokio::test]
    #[ignore]
    async fn test_nats_round_trip() {
        let bus = NatsBus::connect("nats://localhost:4222")
            .await
            .expect("NATS server must be running on localhost:4222");

        let mut stream = bus.subscribe("timesink.test.>").await.unwrap();
        bus.publish("timesink.test.hello", b"{}".to_vec())
            .await
            .unwrap();

        let msg = tokio::time::timeout(std::time::Duration::from_secs(2), stream.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream ended");

        assert_eq!(msg.subject, "timesink.test.hello");
    }
}
