//! Read-side resolvers shared by the REST routes and the GraphQL schema
//!
//! Every call takes the deadline of the request it serves, so one deadline
//! covers all log calls a single GraphQL document makes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::envelope::Envelope;
use crate::identity::IdentityFilter;
use crate::metrics::Metrics;
use crate::repos::{bounded, Deadline, EventLog};
use crate::services::{
    validate_limit, OwnerGraph, OwnerResolution, OwnershipWalker, QueryError, DEFAULT_LIMIT,
};

#[derive(Clone)]
pub struct QuerySurface {
    log: Arc<dyn EventLog>,
    walker: OwnershipWalker,
    metrics: Metrics,
    timeout: Duration,
}

impl QuerySurface {
    pub fn new(
        log: Arc<dyn EventLog>,
        walker: OwnershipWalker,
        metrics: Metrics,
        timeout: Duration,
    ) -> Self {
        Self {
            log,
            walker,
            metrics,
            timeout,
        }
    }

    /// Deadline for a request starting now
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.timeout)
    }

    pub fn max_depth(&self) -> usize {
        self.walker.max_depth()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn get_event(
        &self,
        id: &str,
        deadline: Deadline,
    ) -> Result<Option<Envelope>, QueryError> {
        let started = Instant::now();
        let found = bounded(deadline, self.log.get_by_id(id)).await;
        self.metrics.observe_query("event", started);
        Ok(found?)
    }

    /// Latest event per uid matching the patterns. Absent patterns match
    /// everything, events lacking the field included.
    pub async fn list_events(
        &self,
        api_version: Option<&str>,
        kind: Option<&str>,
        name: Option<&str>,
        limit: Option<i64>,
        deadline: Deadline,
    ) -> Result<Vec<Envelope>, QueryError> {
        let filter = IdentityFilter::from_patterns(api_version, kind, name)?;
        let limit = validate_limit(limit.unwrap_or(DEFAULT_LIMIT))?;

        let started = Instant::now();
        let events = bounded(deadline, self.log.find_all_matching(&filter, limit)).await;
        self.metrics.observe_query("events", started);
        Ok(events?)
    }

    pub async fn owners(&self, envelope: &Envelope, deadline: Deadline) -> OwnerResolution {
        let started = Instant::now();
        let resolution = self.walker.resolve_owners(envelope, deadline).await;
        self.metrics.observe_query("owners", started);
        resolution
    }

    pub async fn owner_graph(
        &self,
        envelope: &Envelope,
        depth: usize,
        deadline: Deadline,
    ) -> OwnerGraph {
        let started = Instant::now();
        let graph = self
            .walker
            .resolve_owner_graph(envelope, depth, deadline)
            .await;
        self.metrics.observe_query("owner_graph", started);
        graph
    }

    pub async fn owned(
        &self,
        envelope: &Envelope,
        limit: Option<i64>,
        deadline: Deadline,
    ) -> Result<Vec<Envelope>, QueryError> {
        let started = Instant::now();
        let owned = self
            .walker
            .resolve_owned(envelope, limit.unwrap_or(DEFAULT_LIMIT), deadline)
            .await;
        self.metrics.observe_query("owned", started);
        owned
    }
}
