//! Event API Routes
//!
//! REST views over the same resolvers the GraphQL schema uses.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ApiError;
use crate::app::AppState;
use crate::envelope::Envelope;
use crate::identity::ObjectIdentity;
use crate::query::EventView;
use crate::services::{OwnerNode, OwnerSlot};

/// Query parameters for the event listing
#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    /// Case-insensitive pattern on `apiVersion`
    #[serde(rename = "apiVersion")]
    pub api_version: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    /// Page size (1-1000, default 10)
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OwnedQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OwnersQuery {
    /// Levels of owners-of-owners to follow (default 1)
    pub depth: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EventList {
    pub events: Vec<EventView>,
    pub count: usize,
}

/// One owner reference as served: the resolved event, or why it is missing
#[derive(Debug, Serialize)]
pub struct OwnerEntry {
    pub reference: Option<ObjectIdentity>,
    pub event: Option<EventView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<OwnerEntry>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl From<&OwnerNode> for OwnerEntry {
    fn from(node: &OwnerNode) -> Self {
        let reference = match &node.slot {
            OwnerSlot::Resolved(_) => None,
            OwnerSlot::NotFound(r) | OwnerSlot::Failed { reference: r, .. } => Some(r.clone()),
        };
        Self {
            reference,
            event: node.slot.envelope().map(EventView::from),
            error: node.slot.hole_message(),
            owners: node.owners.iter().map(OwnerEntry::from).collect(),
            truncated: node.truncated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OwnersResponse {
    pub id: String,
    pub owners: Vec<OwnerEntry>,
    /// Some owner is missing, or the depth limit cut the walk short
    pub partial: bool,
    /// Owners were left unexpanded at the requested depth
    pub truncated: bool,
}

async fn load(state: &AppState, id: &str) -> Result<Envelope, ApiError> {
    state
        .query
        .get_event(id, state.query.deadline())
        .await?
        .ok_or_else(|| ApiError::not_found(format!("event '{}' not found", id)))
}

/// Handler for GET /api/events/{id}
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EventView>, ApiError> {
    let envelope = load(&state, &id).await?;
    Ok(Json(EventView::from(&envelope)))
}

/// Handler for GET /api/events
///
/// # Example
/// ```text
/// GET /api/events?kind=^Pod$&name=web-&limit=20
/// ```
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListEventsQuery>,
) -> Result<Json<EventList>, ApiError> {
    let events = state
        .query
        .list_events(
            params.api_version.as_deref(),
            params.kind.as_deref(),
            params.name.as_deref(),
            params.limit,
            state.query.deadline(),
        )
        .await?;

    let events: Vec<EventView> = events.iter().map(EventView::from).collect();
    Ok(Json(EventList {
        count: events.len(),
        events,
    }))
}

/// Handler for GET /api/events/{id}/owners
///
/// Holes are reported in place; a partial result is still a 200.
pub async fn get_owners(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<OwnersQuery>,
) -> Result<Json<OwnersResponse>, ApiError> {
    let envelope = load(&state, &id).await?;
    let graph = state
        .query
        .owner_graph(&envelope, params.depth.unwrap_or(1), state.query.deadline())
        .await;

    Ok(Json(OwnersResponse {
        id: envelope.id,
        partial: graph.is_partial(),
        truncated: graph.truncated(),
        owners: graph.nodes.iter().map(OwnerEntry::from).collect(),
    }))
}

/// Handler for GET /api/events/{id}/owned
pub async fn get_owned(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<OwnedQuery>,
) -> Result<Json<EventList>, ApiError> {
    let envelope = load(&state, &id).await?;
    let owned = state
        .query
        .owned(&envelope, params.limit, state.query.deadline())
        .await?;

    let events: Vec<EventView> = owned.iter().map(EventView::from).collect();
    Ok(Json(EventList {
        count: events.len(),
        events,
    }))
}
