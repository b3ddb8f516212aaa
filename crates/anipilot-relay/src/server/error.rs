//! Request-facing error type and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::storage::DatabaseError;
use crate::sync::SyncError;

/// Every way a request can fail.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing request fields. The message is returned verbatim.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(AuthError),

    #[error("{0}")]
    NotFound(String),

    /// Store or collaborator failure. Logged; the client sees a generic message.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Request timed out")]
    Timeout,
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Upstream(cause) => {
                error!(error = %cause, "Request failed");
                "Internal error".to_string()
            }
            Self::Timeout => {
                warn!("Request timed out");
                self.to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::CodeNotFound => Self::NotFound(e.to_string()),
            AuthError::Signing(cause) | AuthError::Storage(cause) => Self::Upstream(cause),
            other => Self::Auth(other),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Validation(msg) => Self::Validation(msg),
            SyncError::Storage(cause) => Self::Upstream(cause),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            other => Self::Upstream(other.to_string()),
        }
    }
}
