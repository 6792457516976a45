//! GraphQL schema
//!
//! Built once at startup with the [`QuerySurface`] as schema data. `owners` and
//! `owned` are resolved only when a selection asks for them, one level at a
//! time. A failed owner slot is `null` with an error at its index; a field past
//! the depth limit is `null` with a `PartialGraphFailure` error. Neither fails
//! the rest of the request.

use async_graphql::{
    ComplexObject, Context, EmptyMutation, EmptySubscription, Error, Json, Object, PathSegment,
    Result, Schema, ServerError, SimpleObject, ID,
};
use chrono::SecondsFormat;
use serde_json::Value;

use super::QuerySurface;
use crate::envelope::Envelope;
use crate::repos::Deadline;
use crate::services::OwnerSlot;

pub type TimesinkSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

pub fn build_schema(surface: QuerySurface) -> TimesinkSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(surface)
        .finish()
}

/// The deadline the HTTP handler attached to this request, or a fresh one
fn request_deadline(ctx: &Context<'_>, surface: &QuerySurface) -> Deadline {
    ctx.data_opt::<Deadline>()
        .copied()
        .unwrap_or_else(|| surface.deadline())
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn hello(&self) -> &'static str {
        "world"
    }

    /// Get single event
    async fn event(&self, ctx: &Context<'_>, id: ID) -> Result<Option<EventNode>> {
        let surface = ctx.data::<QuerySurface>()?;
        let found = surface.get_event(&id, request_deadline(ctx, surface)).await?;
        Ok(found.map(|envelope| EventNode::new(envelope, 0)))
    }

    /// Latest event per `metadata.uid` whose identity matches the
    /// case-insensitive patterns
    async fn events(
        &self,
        ctx: &Context<'_>,
        api_version: Option<String>,
        kind: Option<String>,
        name: Option<String>,
        #[graphql(default = 10)] limit: i32,
    ) -> Result<Vec<EventNode>> {
        let surface = ctx.data::<QuerySurface>()?;
        let events = surface
            .list_events(
                api_version.as_deref(),
                kind.as_deref(),
                name.as_deref(),
                Some(i64::from(limit)),
                request_deadline(ctx, surface),
            )
            .await?;
        Ok(events
            .into_iter()
            .map(|envelope| EventNode::new(envelope, 0))
            .collect())
    }
}

/// One stored CloudEvent
#[derive(SimpleObject)]
#[graphql(name = "Event", complex)]
pub struct EventNode {
    id: String,
    #[graphql(name = "type")]
    event_type: String,
    source: String,
    subject: Option<String>,
    time: String,
    data: Json<Value>,
    #[graphql(skip)]
    envelope: Envelope,
    /// Ownership edges followed from the root field to reach this event
    #[graphql(skip)]
    depth: usize,
}

impl EventNode {
    fn new(envelope: Envelope, depth: usize) -> Self {
        Self {
            id: envelope.id.clone(),
            event_type: envelope.event_type.clone(),
            source: envelope.source.clone(),
            subject: envelope.subject.clone(),
            time: envelope.time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            data: Json(envelope.payload.as_value().clone()),
            envelope,
            depth,
        }
    }

    fn check_depth(&self, surface: &QuerySurface) -> Result<()> {
        let max_depth = surface.max_depth();
        if self.depth < max_depth {
            return Ok(());
        }

        tracing::warn!(
            component = "Querier",
            id = %self.id,
            max_depth,
            "ownership depth limit reached"
        );
        surface.metrics().record_owner_hole("depth");
        Err(Error::new(format!(
            "PartialGraphFailure: ownership depth limit {} reached",
            max_depth
        )))
    }
}

#[ComplexObject]
impl EventNode {
    /// Owners as of this event's time, one entry per `ownerReferences` item
    async fn owners(&self, ctx: &Context<'_>) -> Result<Option<Vec<Option<EventNode>>>> {
        let surface = ctx.data::<QuerySurface>()?;
        self.check_depth(surface)?;

        let resolution = surface
            .owners(&self.envelope, request_deadline(ctx, surface))
            .await;

        let owners = resolution
            .slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                OwnerSlot::Resolved(owner) => Some(EventNode::new(owner, self.depth + 1)),
                hole => {
                    let message = hole.hole_message().unwrap_or_default();
                    let mut error = ctx.set_error_path(ServerError::new(message, Some(ctx.item.pos)));
                    error.path.push(PathSegment::Index(i));
                    ctx.add_error(error);
                    None
                }
            })
            .collect();

        Ok(Some(owners))
    }

    /// Events whose first owner reference is this event's object
    async fn owned(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 10)] limit: i32,
    ) -> Result<Option<Vec<EventNode>>> {
        let surface = ctx.data::<QuerySurface>()?;
        self.check_depth(surface)?;

        let owned = surface
            .owned(
                &self.envelope,
                Some(i64::from(limit)),
                request_deadline(ctx, surface),
            )
            .await?;

        Ok(Some(
            owned
                .into_iter()
                .map(|envelope| EventNode::new(envelope, self.depth + 1))
                .collect(),
        ))
    }
}
