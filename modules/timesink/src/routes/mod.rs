pub mod events;
pub mod graphql;
pub mod ingest;
pub mod metrics;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::repos::StorageError;
use crate::services::{IngestError, QueryError};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error response wrapper for proper HTTP error handling
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

fn storage_status(e: &StorageError) -> StatusCode {
    match e {
        StorageError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        StorageError::Database(_) | StorageError::Corrupt { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        let status = match &e {
            QueryError::InvalidPattern(_) | QueryError::InvalidLimit(_) => {
                StatusCode::BAD_REQUEST
            }
            QueryError::Storage(s) => storage_status(s),
        };
        Self::new(status, e.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        let status = match &e {
            IngestError::Validation(_) => StatusCode::BAD_REQUEST,
            IngestError::Storage(s) => storage_status(s),
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::EnvelopeError;

    #[test]
    fn test_status_mapping() {
        let invalid: ApiError = IngestError::Validation(EnvelopeError::MissingField("id")).into();
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

        let timeout: ApiError = QueryError::Storage(StorageError::Timeout).into();
        assert_eq!(timeout.status, StatusCode::GATEWAY_TIMEOUT);

        let stored: ApiError = IngestError::Storage(StorageError::Corrupt {
            id: "e1".into(),
            reason: "bad".into(),
        })
        .into();
        assert_eq!(stored.status, StatusCode::INTERNAL_SERVER_ERROR);

        let limit: ApiError = QueryError::InvalidLimit(0).into();
        assert_eq!(limit.status, StatusCode::BAD_REQUEST);
    }
}
