use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::config::{Config, ServiceRole};
use crate::health::{health, ready};
use crate::identity::MatchPolicy;
use crate::metrics::Metrics;
use crate::middleware::trace_id_middleware;
use crate::query::{build_schema, QuerySurface, TimesinkSchema};
use crate::repos::EventLog;
use crate::routes::{events, graphql, ingest, metrics::metrics_handler};
use crate::services::{OwnershipWalker, Recorder};

/// Shared handler state
pub struct AppState {
    pub log: Arc<dyn EventLog>,
    /// `None` when this process only serves queries
    pub recorder: Option<Recorder>,
    pub query: QuerySurface,
    /// Built once; holds a clone of `query`
    pub schema: TimesinkSchema,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        log: Arc<dyn EventLog>,
        metrics: Metrics,
        role: ServiceRole,
        policy: MatchPolicy,
        max_graph_depth: usize,
        timeout: Duration,
    ) -> Self {
        let walker = OwnershipWalker::new(log.clone(), policy, max_graph_depth, metrics.clone());
        let query = QuerySurface::new(log.clone(), walker, metrics.clone(), timeout);
        let schema = build_schema(query.clone());
        let recorder = role
            .records()
            .then(|| Recorder::new(log.clone(), metrics.clone(), timeout));

        Self {
            log,
            recorder,
            query,
            schema,
            metrics,
        }
    }

    pub fn from_config(log: Arc<dyn EventLog>, metrics: Metrics, config: &Config) -> Self {
        Self::new(
            log,
            metrics,
            config.role,
            config.match_policy,
            config.max_graph_depth,
            config.query_timeout,
        )
    }
}

/// Build the router for the route sets `role` serves
pub fn build_router(state: Arc<AppState>, role: ServiceRole) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(health))
        .route("/api/ready", get(ready))
        .route("/metrics", get(metrics_handler));

    if role.records() {
        app = app
            .route("/", post(ingest::ingest_event))
            .route("/api/events", post(ingest::ingest_event));
    }

    if role.queries() {
        app = app
            .route("/api/events", get(events::list_events))
            .route("/api/events/{id}", get(events::get_event))
            .route("/api/events/{id}/owners", get(events::get_owners))
            .route("/api/events/{id}/owned", get(events::get_owned))
            .route(
                "/graphql",
                get(graphql::graphiql).post(graphql::graphql_handler),
            )
            .route("/query", post(graphql::graphql_handler));
    }

    app.with_state(state)
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}
