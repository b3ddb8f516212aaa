//! Request extractors: authenticated callers and JSON bodies.

use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use super::{ApiError, AppState};
use crate::auth::AuthError;
use crate::storage::User;

/// Header carrying the control plane's signed session parameters.
pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";

/// An agent authenticated by its bearer credential.
#[derive(Debug, Clone)]
pub struct AgentUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<AppState> for AgentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
            .unwrap_or_default();

        let user = state.agent_auth.authenticate(token).await?;
        Ok(Self {
            user,
            token: token.to_string(),
        })
    }
}

/// A control-plane caller with a verified session. The user record is
/// created on first contact.
#[derive(Debug, Clone)]
pub struct WebappUser {
    pub user: User,
}

impl FromRequestParts<AppState> for WebappUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let init_data = parts
            .headers
            .get(INIT_DATA_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let session = state.sessions.validate(init_data)?;
        if session.id == 0 {
            return Err(AuthError::MissingUser.into());
        }
        let user = state
            .db
            .get_or_create_user(session.id, session.display_name(), state.clock.now_ms())
            .await?;
        Ok(Self { user })
    }
}

/// `Json` with rejections reported as validation errors.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::Validation(e.body_text()))?;
        Ok(Self(value))
    }
}
