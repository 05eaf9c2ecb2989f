//! Error types for the engine
//!
//! Provides unified error handling using thiserror. Cache misses are not
//! errors: lookups return `Option` and only genuine failures land here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::queue::QueueError;
use crate::store::StoreError;

// == App Error Enum ==
/// Outcome of a request that did not succeed.
#[derive(Error, Debug)]
pub enum AppError {
    /// Entity genuinely absent from the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Relation already present (duplicate favorite or follow)
    #[error("Already exists: {0}")]
    Duplicate(String),

    /// Cache or store unreachable, including pool exhaustion
    #[error("Store unavailable: {0}")]
    TransientStore(String),

    /// The cache already reflects the mutation but it was not durably queued
    #[error("Mutation applied to cache but not queued: {0}")]
    EnqueueFailure(String),

    /// Malformed queued mutation or cached snapshot
    #[error("Decode error: {0}")]
    Decode(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("record".to_string()),
            StoreError::Conflict { constraint } => AppError::Duplicate(constraint),
            StoreError::Unavailable(msg) => AppError::TransientStore(msg),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Closed | QueueError::Encode(_) => AppError::EnqueueFailure(err.to_string()),
            QueueError::Decode(msg) => AppError::Decode(msg),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::EnqueueFailure(_) | AppError::Decode(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the engine.
pub type Result<T> = std::result::Result<T, AppError>;
