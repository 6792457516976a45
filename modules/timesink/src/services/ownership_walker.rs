//! Ownership Graph Walker
//!
//! Outgoing edges (`owners`) come from the event's own `metadata.ownerReferences`
//! and are resolved as of the event's time, falling back to the owner's latest
//! state when it was only recorded afterwards. Incoming edges (`owned`) are a fan-in
//! scan over the first owner reference of every stored payload.
//!
//! A reference that cannot be resolved becomes a hole in its slot; the other
//! slots are unaffected. Recursive traversal is bounded by `max_depth` since
//! ownership data is not checked for cycles.

use futures::future::{join_all, BoxFuture, FutureExt};
use std::sync::Arc;

use super::{validate_limit, QueryError, TemporalResolver};
use crate::envelope::Envelope;
use crate::identity::{MatchPolicy, ObjectIdentity};
use crate::metrics::Metrics;
use crate::repos::{bounded, Deadline, EventLog};

/// One `ownerReferences` entry after resolution
#[derive(Debug)]
pub enum OwnerSlot {
    Resolved(Envelope),
    NotFound(ObjectIdentity),
    Failed {
        reference: ObjectIdentity,
        error: QueryError,
    },
}

impl OwnerSlot {
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Self::Resolved(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Message describing a hole, `None` when resolved
    pub fn hole_message(&self) -> Option<String> {
        match self {
            Self::Resolved(_) => None,
            Self::NotFound(reference) => Some(format!("owner {} not found", reference)),
            Self::Failed { reference, error } => {
                Some(format!("owner {} could not be resolved: {}", reference, error))
            }
        }
    }
}

/// Owners of one event, in declaration order
#[derive(Debug, Default)]
pub struct OwnerResolution {
    pub slots: Vec<OwnerSlot>,
}

impl OwnerResolution {
    /// True when at least one reference is a hole (PartialGraphFailure)
    pub fn is_partial(&self) -> bool {
        self.slots.iter().any(|s| s.envelope().is_none())
    }

    pub fn resolved(&self) -> impl Iterator<Item = &Envelope> {
        self.slots.iter().filter_map(OwnerSlot::envelope)
    }
}

#[derive(Debug)]
pub struct OwnerNode {
    pub slot: OwnerSlot,
    pub owners: Vec<OwnerNode>,
    /// The resolved owner has references of its own that were not followed
    pub truncated: bool,
}

/// Owners-of-owners up to a fixed depth
#[derive(Debug, Default)]
pub struct OwnerGraph {
    pub nodes: Vec<OwnerNode>,
    /// Levels actually followed
    pub depth: usize,
    /// The requested depth was above the configured maximum
    pub clamped: bool,
}

impl OwnerGraph {
    pub fn truncated(&self) -> bool {
        fn any_truncated(nodes: &[OwnerNode]) -> bool {
            nodes.iter().any(|n| n.truncated || any_truncated(&n.owners))
        }
        any_truncated(&self.nodes)
    }

    /// Traversal stopped at the maximum depth with owners left to follow
    pub fn depth_exceeded(&self) -> bool {
        self.clamped && self.truncated()
    }

    pub fn is_partial(&self) -> bool {
        fn any_hole(nodes: &[OwnerNode]) -> bool {
            nodes
                .iter()
                .any(|n| n.slot.envelope().is_none() || any_hole(&n.owners))
        }
        self.depth_exceeded() || any_hole(&self.nodes)
    }
}

#[derive(Clone)]
pub struct OwnershipWalker {
    resolver: TemporalResolver,
    log: Arc<dyn EventLog>,
    max_depth: usize,
    metrics: Metrics,
}

impl OwnershipWalker {
    pub fn new(
        log: Arc<dyn EventLog>,
        policy: MatchPolicy,
        max_depth: usize,
        metrics: Metrics,
    ) -> Self {
        Self {
            resolver: TemporalResolver::new(log.clone(), policy),
            log,
            max_depth,
            metrics,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolve each owner reference of `envelope` as of `envelope.time`.
    ///
    /// Lookups run concurrently; slots keep declaration order. Never fails as a
    /// whole: missing or failed owners are reported per slot.
    pub async fn resolve_owners(&self, envelope: &Envelope, deadline: Deadline) -> OwnerResolution {
        let declared_at = envelope.time;
        let lookups = envelope.owner_references().into_iter().map(|reference| async move {
            match self
                .resolver
                .resolve_declared_owner(&reference, declared_at, deadline)
                .await
            {
                Ok(Some(owner)) => OwnerSlot::Resolved(owner),
                Ok(None) => {
                    self.metrics.record_owner_hole("not_found");
                    OwnerSlot::NotFound(reference)
                }
                Err(error) => {
                    tracing::warn!(
                        component = "Querier",
                        id = %envelope.id,
                        owner = %reference,
                        error = %error,
                        "owner lookup failed"
                    );
                    self.metrics.record_owner_hole("error");
                    OwnerSlot::Failed { reference, error }
                }
            }
        });

        OwnerResolution {
            slots: join_all(lookups).await,
        }
    }

    /// Events whose first owner reference identifies the object `envelope` describes.
    ///
    /// An envelope whose payload carries no identity owns nothing.
    pub async fn resolve_owned(
        &self,
        envelope: &Envelope,
        limit: i64,
        deadline: Deadline,
    ) -> Result<Vec<Envelope>, QueryError> {
        let limit = validate_limit(limit)?;
        let identity = match envelope.identity() {
            Ok(identity) => identity,
            Err(e) => {
                tracing::debug!(component = "Querier", id = %envelope.id, reason = %e, "no identity");
                return Ok(Vec::new());
            }
        };

        let filter = self.resolver.filter_for(&identity)?;
        let owned = bounded(deadline, self.log.find_owned_by_primary_owner(&filter, limit)).await?;
        Ok(owned)
    }

    /// Follow owners recursively. `depth` is clamped to `max_depth`; owners left
    /// unexpanded at the bound are marked truncated.
    pub async fn resolve_owner_graph(
        &self,
        envelope: &Envelope,
        depth: usize,
        deadline: Deadline,
    ) -> OwnerGraph {
        let limit = self.max_depth.max(1);
        let graph = OwnerGraph {
            nodes: self.walk(envelope, depth.clamp(1, limit), deadline).await,
            depth: depth.clamp(1, limit),
            clamped: depth > limit,
        };

        if graph.depth_exceeded() {
            tracing::warn!(
                component = "Querier",
                id = %envelope.id,
                max_depth = limit,
                "ownership depth limit reached"
            );
            self.metrics.record_owner_hole("depth");
        }
        graph
    }

    fn walk<'a>(
        &'a self,
        envelope: &'a Envelope,
        remaining: usize,
        deadline: Deadline,
    ) -> BoxFuture<'a, Vec<OwnerNode>> {
        async move {
            let resolution = self.resolve_owners(envelope, deadline).await;
            let mut nodes = Vec::with_capacity(resolution.slots.len());

            for slot in resolution.slots {
                let (owners, truncated) = match slot.envelope() {
                    Some(owner) if remaining > 1 => {
                        (self.walk(owner, remaining - 1, deadline).await, false)
                    }
                    Some(owner) => (Vec::new(), !owner.owner_references().is_empty()),
                    _ => (Vec::new(), false),
                };
                nodes.push(OwnerNode {
                    slot,
                    owners,
                    truncated,
                });
            }

            nodes
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::InMemoryEventLog;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use event_bus::new_event;
    use serde_json::{json, Value};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    async fn record(log: &InMemoryEventLog, id: &str, minutes: i64, data: Value) -> Envelope {
        let envelope =
            Envelope::from_cloud_event(new_event(id, "t", "s", t(minutes), data).unwrap()).unwrap();
        log.append(&envelope).await.unwrap();
        envelope
    }

    fn deadline() -> Deadline {
        Deadline::after(std::time::Duration::from_secs(1))
    }

    fn walker(log: Arc<InMemoryEventLog>, max_depth: usize) -> OwnershipWalker {
        OwnershipWalker::new(log, MatchPolicy::Exact, max_depth, Metrics::new().unwrap())
    }

    fn object(kind: &str, name: &str, owners: &[(&str, &str)]) -> Value {
        let refs: Vec<Value> = owners
            .iter()
            .map(|(k, n)| json!({"apiVersion": "v1", "kind": k, "name": n}))
            .collect();
        json!({
            "apiVersion": "v1",
            "kind": kind,
            "metadata": {"name": name, "uid": format!("{}-{}", kind, name), "ownerReferences": refs}
        })
    }

    #[tokio::test]
    async fn test_holes_keep_declaration_order() {
        let log = Arc::new(InMemoryEventLog::new());
        record(&log, "rs", 0, object("ReplicaSet", "rs1", &[])).await;
        record(&log, "node", 0, object("Node", "n1", &[])).await;
        let pod = record(
            &log,
            "pod",
            1,
            object("Pod", "p1", &[("ReplicaSet", "rs1"), ("Missing", "x"), ("Node", "n1")]),
        )
        .await;

        let resolution = walker(log, 8).resolve_owners(&pod, deadline()).await;

        assert_eq!(resolution.slots.len(), 3);
        assert_eq!(resolution.slots[0].envelope().unwrap().id, "rs");
        assert!(matches!(&resolution.slots[1], OwnerSlot::NotFound(r) if r.kind == "Missing"));
        assert_eq!(resolution.slots[2].envelope().unwrap().id, "node");
        assert!(resolution.is_partial());
    }

    #[tokio::test]
    async fn test_owner_state_at_declaration_wins_over_later_state() {
        let log = Arc::new(InMemoryEventLog::new());
        record(&log, "rs-old", 0, object("ReplicaSet", "rs1", &[])).await;
        let pod = record(&log, "pod", 1, object("Pod", "p1", &[("ReplicaSet", "rs1")])).await;
        record(&log, "rs-new", 5, object("ReplicaSet", "rs1", &[])).await;

        let resolution = walker(log, 8).resolve_owners(&pod, deadline()).await;
        assert_eq!(resolution.slots[0].envelope().unwrap().id, "rs-old");
    }

    #[tokio::test]
    async fn test_owner_recorded_after_owned_event_falls_back_to_latest() {
        let log = Arc::new(InMemoryEventLog::new());
        let pod = record(&log, "pod", 0, object("Pod", "p1", &[("ReplicaSet", "rs1")])).await;
        record(&log, "rs", 5, object("ReplicaSet", "rs1", &[])).await;

        let resolution = walker(log, 8).resolve_owners(&pod, deadline()).await;
        assert_eq!(resolution.slots[0].envelope().unwrap().id, "rs");
    }

    #[tokio::test]
    async fn test_owned_only_sees_primary_owner() {
        let log = Arc::new(InMemoryEventLog::new());
        let rs = record(&log, "rs", 0, object("ReplicaSet", "rs1", &[])).await;
        record(&log, "p1", 1, object("Pod", "p1", &[("ReplicaSet", "rs1")])).await;
        record(
            &log,
            "p2",
            1,
            object("Pod", "p2", &[("Node", "n1"), ("ReplicaSet", "rs1")]),
        )
        .await;

        let owned = walker(log, 8).resolve_owned(&rs, 10, deadline()).await.unwrap();
        let ids: Vec<&str> = owned.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["p1"]);
    }

    #[tokio::test]
    async fn test_owned_without_identity_is_empty() {
        let log = Arc::new(InMemoryEventLog::new());
        let bare = record(&log, "bare", 0, json!({"hello": "world"})).await;

        let owned = walker(log, 8).resolve_owned(&bare, 10, deadline()).await.unwrap();
        assert!(owned.is_empty());
    }

    #[tokio::test]
    async fn test_owned_rejects_out_of_range_limit() {
        let log = Arc::new(InMemoryEventLog::new());
        let rs = record(&log, "rs", 0, object("ReplicaSet", "rs1", &[])).await;

        let result = walker(log, 8).resolve_owned(&rs, 0, deadline()).await;
        assert!(matches!(result, Err(QueryError::InvalidLimit(0))));
    }

    #[tokio::test]
    async fn test_cyclic_ownership_is_bounded() {
        let log = Arc::new(InMemoryEventLog::new());
        record(&log, "a", 0, object("Thing", "a", &[("Thing", "b")])).await;
        let b = record(&log, "b", 0, object("Thing", "b", &[("Thing", "a")])).await;

        let graph = walker(log, 3).resolve_owner_graph(&b, 50, deadline()).await;

        assert_eq!(graph.depth, 3);
        assert!(graph.clamped);
        assert!(graph.depth_exceeded());
        assert!(graph.is_partial());

        let level1 = &graph.nodes[0];
        let level2 = &level1.owners[0];
        let level3 = &level2.owners[0];
        assert_eq!(level1.slot.envelope().unwrap().id, "a");
        assert_eq!(level2.slot.envelope().unwrap().id, "b");
        assert_eq!(level3.slot.envelope().unwrap().id, "a");
        assert!(level3.truncated);
        assert!(level3.owners.is_empty());
    }

    #[tokio::test]
    async fn test_graph_of_root_object_is_complete() {
        let log = Arc::new(InMemoryEventLog::new());
        record(&log, "deploy", 0, object("Deployment", "d1", &[])).await;
        record(&log, "rs", 1, object("ReplicaSet", "rs1", &[("Deployment", "d1")])).await;
        let pod = record(&log, "pod", 2, object("Pod", "p1", &[("ReplicaSet", "rs1")])).await;

        let graph = walker(log, 8).resolve_owner_graph(&pod, 8, deadline()).await;

        assert!(!graph.is_partial());
        assert_eq!(graph.nodes[0].owners[0].slot.envelope().unwrap().id, "deploy");
    }

    #[tokio::test]
    async fn test_shallow_request_is_not_a_failure() {
        let log = Arc::new(InMemoryEventLog::new());
        record(&log, "deploy", 0, object("Deployment", "d1", &[])).await;
        record(&log, "rs", 1, object("ReplicaSet", "rs1", &[("Deployment", "d1")])).await;
        let pod = record(&log, "pod", 2, object("Pod", "p1", &[("ReplicaSet", "rs1")])).await;

        let graph = walker(log, 8).resolve_owner_graph(&pod, 1, deadline()).await;

        assert!(graph.truncated());
        assert!(!graph.depth_exceeded());
        assert!(!graph.is_partial());
    }
}
