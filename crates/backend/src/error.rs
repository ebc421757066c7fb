//! Unified error handling for the backend API.
//!
//! Handlers return `ApiResult<T>` and use `?` freely. Every variant maps to an
//! HTTP status and a machine-readable `error` kind so clients can tell a
//! missing email from a failed send without parsing messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::DatabaseErrorKind;
use diesel_async::pooled_connection::deadpool::PoolError;
use serde::Serialize;
use thiserror::Error;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Database connection pool error
    #[error("Database connection error")]
    ConnectionPool(#[source] PoolError),

    /// Database query error
    #[error("Database error: {0}")]
    Database(#[source] diesel::result::Error),

    /// Anything else that went wrong inside a component
    #[error("{0}")]
    Internal(anyhow::Error),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Environment variable missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reply generation was asked for an email that is not an invitation
    #[error("Email is not an interview invitation")]
    NotInterview,

    /// The model could not be reached for extraction
    #[error("Interview details could not be extracted")]
    ExtractionFailed,

    /// The model produced no reply body
    #[error("Reply could not be generated")]
    GenerationFailed,

    /// The reply address derived from the original sender is unusable
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    /// The draft was already delivered
    #[error("Draft has already been sent")]
    AlreadySent,

    /// The mail provider rejected or did not answer the send request
    #[error("Mail provider did not accept the message")]
    SendFailed,
}

impl ApiError {
    /// Create a not found error with a custom message
    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound(resource.into())
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Create a config error for missing env vars
    pub fn missing_env(var_name: &str) -> Self {
        ApiError::Config(format!("{} environment variable must be set", var_name))
    }

    /// Machine-readable error kind included in every error body
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::ConnectionPool(_) => "database_unavailable",
            ApiError::Database(diesel::result::Error::NotFound) => "not_found",
            ApiError::Database(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => "conflict",
            ApiError::Database(_) => "database_error",
            ApiError::Internal(_) => "internal_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Config(_) => "configuration_error",
            ApiError::NotInterview => "not_interview",
            ApiError::ExtractionFailed => "extraction_failed",
            ApiError::GenerationFailed => "generation_failed",
            ApiError::InvalidRecipient(_) => "invalid_recipient",
            ApiError::AlreadySent => "already_sent",
            ApiError::SendFailed => "send_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(diesel::result::Error::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Database(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Internal(_) | ApiError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_)
            | ApiError::NotInterview
            | ApiError::ExtractionFailed
            | ApiError::GenerationFailed
            | ApiError::InvalidRecipient(_) => StatusCode::BAD_REQUEST,
            ApiError::AlreadySent => StatusCode::CONFLICT,
            ApiError::SendFailed => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        ApiError::ConnectionPool(err)
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(err: diesel::result::Error) -> Self {
        ApiError::Database(err)
    }
}

/// Store and client code reports through `anyhow`; recover the database
/// variants so pool exhaustion still surfaces as 503.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<PoolError>() {
            Ok(pool_err) => return ApiError::ConnectionPool(pool_err),
            Err(err) => err,
        };
        match err.downcast::<diesel::result::Error>() {
            Ok(db_err) => ApiError::Database(db_err),
            Err(err) => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details) = match &self {
            ApiError::ConnectionPool(e) => {
                tracing::error!("Connection pool error: {:?}", e);
                ("Database connection unavailable".to_string(), None)
            }
            ApiError::Database(diesel::result::Error::NotFound) => {
                ("Resource not found".to_string(), None)
            }
            ApiError::Database(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                info,
            )) => (
                "Resource already exists".to_string(),
                info.constraint_name().map(str::to_string),
            ),
            ApiError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                ("Database operation failed".to_string(), None)
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                ("Internal server error".to_string(), Some(format!("{:#}", e)))
            }
            ApiError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                ("Server configuration error".to_string(), None)
            }
            other => (other.to_string(), None),
        };

        let body = Json(ErrorResponse {
            error: self.kind(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
