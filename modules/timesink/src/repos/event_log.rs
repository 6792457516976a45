//! Event log contract
//!
//! The log is append-only: rows are added by the recorder and never updated or
//! deleted. Reads address envelopes by producer-assigned id or by payload
//! identity fields; there is no index from an object to the events that mention
//! it, so identity lookups are payload scans bounded by `limit`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::envelope::Envelope;
use crate::identity::IdentityFilter;

/// Errors from the storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("event log call exceeded its deadline")]
    Timeout,

    #[error("stored event '{id}' could not be decoded: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Point in time by which an event log call must complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }
}

/// Run an event log call under a deadline. Expiry is a `StorageError::Timeout`,
/// never an empty result.
pub async fn bounded<T, F>(deadline: Deadline, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::time::timeout_at(deadline.instant(), call)
        .await
        .map_err(|_| StorageError::Timeout)?
}

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one envelope as a new row
    async fn append(&self, envelope: &Envelope) -> Result<(), StorageError>;

    /// Most recent envelope carrying `id` (ids are producer-assigned and may repeat)
    async fn get_by_id(&self, id: &str) -> Result<Option<Envelope>, StorageError>;

    /// Every row carrying `id`, oldest first
    async fn find_all_by_id(&self, id: &str) -> Result<Vec<Envelope>, StorageError>;

    /// Latest envelope whose payload identity matches `filter` with `time <= as_of`
    /// (or latest overall when `as_of` is `None`). Equal times resolve to the
    /// greatest id.
    async fn find_latest_matching(
        &self,
        filter: &IdentityFilter,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Option<Envelope>, StorageError>;

    /// Up to `limit` matching envelopes, one per `metadata.uid` (its latest), ordered
    /// by uid then time descending. Envelopes without a uid are never merged.
    async fn find_all_matching(
        &self,
        filter: &IdentityFilter,
        limit: i64,
    ) -> Result<Vec<Envelope>, StorageError>;

    /// Like `find_all_matching`, but the filter applies to the first entry of
    /// `metadata.ownerReferences` only. Events naming the owner in a later
    /// position are not found.
    async fn find_owned_by_primary_owner(
        &self,
        owner: &IdentityFilter,
        limit: i64,
    ) -> Result<Vec<Envelope>, StorageError>;

    /// Cheap liveness check
    async fn ping(&self) -> Result<(), StorageError>;
}

impl std::fmt::Debug for dyn EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventLog")
    }
}
