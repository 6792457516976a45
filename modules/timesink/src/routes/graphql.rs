use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{extract::State, response::Html};
use std::sync::Arc;
use std::time::Instant;

use crate::app::AppState;

/// Handler for POST /graphql and POST /query
///
/// Always a 200 once the body parses: validation failures and per-field
/// errors are reported in `errors` next to whatever `data` resolved.
pub async fn graphql_handler(
    State(state): State<Arc<AppState>>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let started = Instant::now();
    // One deadline for every log call the document makes
    let request = request.into_inner().data(state.query.deadline());
    let response = state.schema.execute(request).await;
    state.metrics.observe_query("graphql", started);

    if response.is_err() {
        tracing::warn!(
            component = "Querier",
            errors = response.errors.len(),
            "query completed with errors"
        );
    }
    response.into()
}

/// Handler for GET /graphql
pub async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}
