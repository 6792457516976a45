//! In-memory EventBus for tests and local runs without a broker

use crate::{BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// EventBus backed by a single tokio broadcast channel
///
/// Every subscriber sees every message and filters by its own subject pattern.
/// A subscriber that falls more than `capacity` messages behind loses the
/// oldest ones; the loss is logged.
#[derive(Clone)]
pub struct InMemoryBus {
    sender: Arc<broadcast::Sender<BusMessage>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// NATS-style subject matching (`*` = one token, `>` = one or more trailing tokens)
    pub(crate) fn subject_matches(subject: &str, pattern: &str) -> bool {
        let mut subject_tokens = subject.split('.');
        let mut pattern_tokens = pattern.split('.').peekable();

        while let Some(p) = pattern_tokens.next() {
            if p == ">" {
                return pattern_tokens.peek().is_none() && subject_tokens.next().is_some();
            }
            match subject_tokens.next() {
                Some(s) if p == "*" || p == s => continue,
                _ => return false,
            }
        }

        subject_tokens.next().is_none()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        // No receivers is not an error
        let _ = self
            .sender
            .send(BusMessage::new(subject.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(msg) if Self::subject_matches(&msg.subject, &pattern) => yield msg,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(pattern = %pattern, skipped, "InMemoryBus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(stream.boxed())
    }
}
