//! Agent-facing endpoints. All but `/auth/verify` require a bearer credential.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::extract::{AgentUser, JsonBody};
use super::{ApiError, AppState};
use crate::notifications::templates;
use crate::storage::StatePatch;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    code: Option<String>,
}

/// `POST /api/auth/verify`: trade a pairing code for a credential.
#[instrument(skip_all)]
pub async fn verify(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<VerifyRequest>,
) -> Result<Json<Value>, ApiError> {
    let code = req
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("No code".into()))?;

    let redeemed = state.pairing.redeem(&code).await?;
    state
        .dispatcher
        .spawn_direct(redeemed.user.chat_id, templates::agent_linked());

    Ok(Json(json!({
        "ok": true,
        "token": redeemed.token,
        "chatId": redeemed.user.chat_id,
        "username": redeemed.user.username,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    state: Option<StatePatch>,
}

/// `POST /api/heartbeat`
pub async fn heartbeat(
    State(state): State<AppState>,
    agent: AgentUser,
    JsonBody(req): JsonBody<HeartbeatRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .sync
        .record_heartbeat(&agent.user.id, req.state.unwrap_or_default())
        .await?;
    Ok(Json(json!({ "ok": true })))
}

/// `GET /api/commands`
pub async fn commands(
    State(state): State<AppState>,
    agent: AgentUser,
) -> Result<Json<Value>, ApiError> {
    let commands = state.sync.poll_pending(&agent.user.id).await?;
    Ok(Json(json!({ "commands": commands })))
}

/// `POST /api/commands/{id}/done`
pub async fn command_done(
    State(state): State<AppState>,
    agent: AgentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::Validation("Invalid command id".into()))?;
    state.sync.acknowledge(id, &agent.user.id).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

/// `POST /api/event`: an incident reported by the agent, forwarded as a
/// best-effort notification.
pub async fn event(
    State(state): State<AppState>,
    agent: AgentUser,
    JsonBody(req): JsonBody<EventRequest>,
) -> Result<Json<Value>, ApiError> {
    let kind = req
        .kind
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("No type".into()))?;

    state.dispatcher.spawn_send(
        agent.user.id,
        kind,
        req.payload.unwrap_or_else(|| json!({})),
    );
    Ok(Json(json!({ "ok": true })))
}

/// `POST /api/offline`
pub async fn offline(
    State(state): State<AppState>,
    agent: AgentUser,
) -> Result<Json<Value>, ApiError> {
    state.sync.declare_offline(&agent.user.id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// `POST /api/logout`: revoke the presented credential.
pub async fn logout(
    State(state): State<AppState>,
    agent: AgentUser,
) -> Result<Json<Value>, ApiError> {
    state.pairing.revoke(&agent.user.id, &agent.token).await?;
    state.sync.declare_offline(&agent.user.id).await?;
    Ok(Json(json!({ "ok": true })))
}
