//! Unified error types for the contact trust agent
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for authorization handling
#[derive(Error, Debug)]
pub enum AuthzError {
    /// Inbound authorization message rejected at admission
    #[error("Malformed authorization request: {0}")]
    MalformedRequest(String),

    /// Decision rejected before any state was touched
    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    /// Decision issued for a request that is no longer pending
    #[error("Authorization request {0} is no longer pending")]
    RequestVanished(String),

    /// Contact store refused a write
    #[error("Contact store write failed: {0}")]
    StoreWriteFailure(String),

    /// Handle lookup errors
    #[error("Handle lookup failed: {0}")]
    Lookup(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The owner task has shut down
    #[error("Authorization agent is not running")]
    AgentUnavailable,

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthzError {
    /// Whether the caller can retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthzError::StoreWriteFailure(_) | AuthzError::Lookup(_) | AuthzError::Database(_)
        )
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
}

/// Convert AuthzError to HTTP response
impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let retryable = self.is_retryable();
        let (status, error_code, message) = match self {
            AuthzError::MalformedRequest(_) => (
                StatusCode::BAD_REQUEST,
                "MalformedRequest",
                self.to_string(),
            ),
            AuthzError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            AuthzError::InvalidDecision(ref reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "InvalidDecision",
                reason.clone(),
            ),
            AuthzError::RequestVanished(_) => (
                StatusCode::CONFLICT,
                "RequestVanished",
                self.to_string(),
            ),
            AuthzError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            AuthzError::StoreWriteFailure(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "StoreWriteFailure",
                "Contact could not be saved, try again".to_string(),
            ),
            AuthzError::AgentUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "AgentUnavailable",
                self.to_string(),
            ),
            AuthzError::Lookup(_) => (
                StatusCode::BAD_GATEWAY,
                "LookupFailed",
                self.to_string(),
            ),
            AuthzError::Database(_) | AuthzError::Internal(_) | AuthzError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
            AuthzError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            retryable,
        });

        (status, body).into_response()
    }
}

/// Result type alias for authorization operations
pub type AuthzResult<T> = Result<T, AuthzError>;
