//! Request middleware.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::{ApiError, AppState};

/// Fail any request that runs longer than the configured limit with 504.
pub async fn enforce_timeout(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    tokio::time::timeout(limit, next.run(request))
        .await
        .unwrap_or_else(|_| ApiError::Timeout.into_response())
}

/// Give the liveness monitor a chance to sweep. Never delays the request.
pub async fn trigger_liveness(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let _ = state.liveness.trigger();
    next.run(request).await
}
