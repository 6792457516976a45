//! In-memory event log for tests and `EVENT_LOG=inmemory` runs
//!
//! Mirrors the Postgres queries row for row: same matching rules, same
//! deduplication, same ordering. Contents are lost when the process exits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::event_log::{EventLog, StorageError};
use super::matching::{latest, latest_per_uid, matches, MatchTarget};
use crate::envelope::Envelope;
use crate::identity::IdentityFilter;

#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    rows: RwLock<Vec<Envelope>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    async fn matching(&self, target: MatchTarget, filter: &IdentityFilter) -> Vec<Envelope> {
        let rows = self.rows.read().await;
        rows.iter()
            .filter(|e| matches(e, target, filter))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, envelope: &Envelope) -> Result<(), StorageError> {
        self.rows.write().await.push(envelope.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Envelope>, StorageError> {
        let rows = self.rows.read().await;
        // Later insertion wins a time tie
        let found = rows
            .iter()
            .enumerate()
            .filter(|(_, e)| e.id == id)
            .max_by(|(ia, a), (ib, b)| a.time.cmp(&b.time).then(ia.cmp(ib)))
            .map(|(_, e)| e.clone());
        Ok(found)
    }

    async fn find_all_by_id(&self, id: &str) -> Result<Vec<Envelope>, StorageError> {
        let rows = self.rows.read().await;
        let mut found: Vec<Envelope> = rows.iter().filter(|e| e.id == id).cloned().collect();
        // Stable sort keeps insertion order among equal times
        found.sort_by_key(|e| e.time);
        Ok(found)
    }

    async fn find_latest_matching(
        &self,
        filter: &IdentityFilter,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Option<Envelope>, StorageError> {
        let candidates = self.matching(MatchTarget::Identity, filter).await;
        Ok(latest(candidates, as_of))
    }

    async fn find_all_matching(
        &self,
        filter: &IdentityFilter,
        limit: i64,
    ) -> Result<Vec<Envelope>, StorageError> {
        let candidates = self.matching(MatchTarget::Identity, filter).await;
        Ok(latest_per_uid(candidates, limit))
    }

    async fn find_owned_by_primary_owner(
        &self,
        owner: &IdentityFilter,
        limit: i64,
    ) -> Result<Vec<Envelope>, StorageError> {
        let candidates = self.matching(MatchTarget::PrimaryOwner, owner).await;
        Ok(latest_per_uid(candidates, limit))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
