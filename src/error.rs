//! Error types for the upstream access layer
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Access Error Enum ==
/// Unified error type for the access layer.
///
/// Cloneable so that a single deduplicated settlement can be handed to every
/// waiting caller.
#[derive(Error, Debug, Clone)]
pub enum AccessError {
    /// The wrapped upstream fetcher failed
    #[error("Upstream failure: {0}")]
    Upstream(Arc<anyhow::Error>),

    /// The circuit breaker rejected the call without touching the upstream
    #[error("Circuit breaker is open, upstream presumed down")]
    BreakerOpen,

    /// The admission queue is saturated
    #[error("Admission queue is full ({capacity} waiting)")]
    QueueFull { capacity: usize },

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccessError {
    /// Wraps an upstream fetcher error.
    pub fn upstream(err: anyhow::Error) -> Self {
        AccessError::Upstream(Arc::new(err))
    }

    /// Returns true for errors the circuit breaker should record as failures.
    ///
    /// Protective rejections raised by the access layer itself never count.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(self, AccessError::Upstream(_) | AccessError::Internal(_))
    }

    /// Returns true when the error means "temporarily unavailable" rather
    /// than "the upstream answered badly".
    pub fn is_protective(&self) -> bool {
        matches!(self, AccessError::BreakerOpen | AccessError::QueueFull { .. })
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = match &self {
            AccessError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AccessError::BreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
            AccessError::QueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AccessError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AccessError::NotFound(_) => StatusCode::NOT_FOUND,
            AccessError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the access layer.
pub type Result<T> = std::result::Result<T, AccessError>;
