//! Temporal Resolver
//!
//! Objects have no row of their own. The state of object X as of time T is the
//! most recent envelope identifying X with `time <= T`; without T it is the most
//! recent envelope identifying X at all. No match is a normal outcome (the owner
//! may never have been recorded), reported as `None`.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::QueryError;
use crate::envelope::Envelope;
use crate::identity::{IdentityFilter, MatchPolicy, ObjectIdentity};
use crate::repos::{bounded, Deadline, EventLog};

#[derive(Clone)]
pub struct TemporalResolver {
    log: Arc<dyn EventLog>,
    policy: MatchPolicy,
}

impl TemporalResolver {
    pub fn new(log: Arc<dyn EventLog>, policy: MatchPolicy) -> Self {
        Self { log, policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Identity filter for `identity` under the configured policy
    pub fn filter_for(&self, identity: &ObjectIdentity) -> Result<IdentityFilter, QueryError> {
        Ok(IdentityFilter::for_identity(identity, self.policy)?)
    }

    pub async fn resolve_owner(
        &self,
        identity: &ObjectIdentity,
        as_of: Option<DateTime<Utc>>,
        deadline: Deadline,
    ) -> Result<Option<Envelope>, QueryError> {
        let filter = self.filter_for(identity)?;
        let found = bounded(deadline, self.log.find_latest_matching(&filter, as_of)).await?;

        tracing::debug!(
            component = "Querier",
            owner = %identity,
            as_of = ?as_of,
            found = ?found.as_ref().map(|e| &e.id),
            "resolved owner"
        );

        Ok(found)
    }

    /// Owner state for a reference declared at `declared_at`: the state as of
    /// that time, or the latest state when the owner was first recorded later.
    pub async fn resolve_declared_owner(
        &self,
        identity: &ObjectIdentity,
        declared_at: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<Option<Envelope>, QueryError> {
        match self.resolve_owner(identity, Some(declared_at), deadline).await? {
            Some(owner) => Ok(Some(owner)),
            None => self.resolve_owner(identity, None, deadline).await,
        }
    }
}
