//! API error type and its HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use matching_engine::EngineError;
use order_store::StoreError;

/// Client-facing error for every handler
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(msg) => ApiError::BadRequest(msg),
            EngineError::OrderNotFound(id) => ApiError::NotFound(format!("order {}", id)),
            EngineError::NotCancellable { .. } => ApiError::Conflict(e.to_string()),
            EngineError::UnitRetriesExhausted { .. } => ApiError::Unavailable(e.to_string()),
            EngineError::Store(store) => ApiError::from(store),
            EngineError::MatcherGone => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::OrderNotFound(id) => ApiError::NotFound(format!("order {}", id)),
            StoreError::NotCancellable { .. } => ApiError::Conflict(e.to_string()),
            StoreError::Transient(_) => ApiError::Unavailable(e.to_string()),
            StoreError::Schema(_) | StoreError::Backend(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
            ApiError::Internal(msg) => {
                // Internals are logged, not leaked.
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{OrderId, OrderStatus};

    #[test]
    fn test_engine_error_mapping() {
        assert!(matches!(
            ApiError::from(EngineError::Validation("x".into())),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(EngineError::OrderNotFound(OrderId::new())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(EngineError::NotCancellable {
                id: OrderId::new(),
                status: OrderStatus::Filled,
            }),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(EngineError::Store(StoreError::Transient("busy".into()))),
            ApiError::Unavailable(_)
        ));
    }
}
