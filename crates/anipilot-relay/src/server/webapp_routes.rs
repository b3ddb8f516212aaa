//! Control-plane endpoints, authenticated by signed session parameters.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use super::extract::{JsonBody, WebappUser};
use super::{ApiError, AppState};
use crate::marathon::{MarathonAction, MarathonOutcome};
use crate::storage::{SettingsPatch, SyncState};

#[derive(Debug, Serialize)]
struct StateView {
    #[serde(flatten)]
    state: SyncState,
    agent_reachable: bool,
}

/// `GET /api/webapp/state`
pub async fn state(
    State(app): State<AppState>,
    caller: WebappUser,
) -> Result<Json<Value>, ApiError> {
    let view = app.sync.state(&caller.user.id).await?.map(|state| StateView {
        agent_reachable: app.sync.reachable(&state),
        state,
    });
    Ok(Json(json!({
        "ok": true,
        "state": view,
        "user": { "id": caller.user.id, "username": caller.user.username },
    })))
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(default, rename = "type")]
    command_type: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

/// `POST /api/webapp/command`: queue a command for the agent and report
/// whether it is likely to be picked up soon.
pub async fn command(
    State(app): State<AppState>,
    caller: WebappUser,
    JsonBody(req): JsonBody<CommandRequest>,
) -> Result<Json<Value>, ApiError> {
    let command_type = req
        .command_type
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("No type".into()))?;
    let payload = req.payload.unwrap_or_else(|| json!({}));

    let id = app
        .sync
        .enqueue(&caller.user.id, &command_type, &payload)
        .await?;
    // The command is already queued; a failed read only loses the hint.
    let reachable = app
        .sync
        .is_reachable(&caller.user.id)
        .await
        .unwrap_or_else(|e| {
            warn!(user_id = %caller.user.id, error = %e, "Reachability check failed");
            false
        });
    Ok(Json(json!({ "ok": true, "id": id, "agent_reachable": reachable })))
}

#[derive(Debug, Deserialize)]
pub struct MarathonRequest {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

/// `POST /api/webapp/marathon`
pub async fn marathon(
    State(app): State<AppState>,
    caller: WebappUser,
    JsonBody(req): JsonBody<MarathonRequest>,
) -> Result<Json<Value>, ApiError> {
    let action = req
        .action
        .ok_or_else(|| ApiError::Validation("No action".into()))?;
    let action = MarathonAction::parse(&action, req.payload)?;

    match app.marathon.apply(&caller.user.id, action).await? {
        MarathonOutcome::Applied => Ok(Json(json!({ "ok": true }))),
        MarathonOutcome::Exists => Ok(Json(json!({ "ok": true, "msg": "exists" }))),
    }
}

/// `GET /api/webapp/settings`
pub async fn get_settings(caller: WebappUser) -> Json<Value> {
    let user = caller.user;
    Json(json!({
        "ok": true,
        "connected": user.token.is_some(),
        "settings": {
            "notify_crash": user.notify_crash,
            "notify_marathon": user.notify_marathon,
            "notify_offline": user.notify_offline,
            "notify_digest": user.notify_digest,
        },
    }))
}

/// `POST /api/webapp/settings`: update only the flags present.
pub async fn save_settings(
    State(app): State<AppState>,
    caller: WebappUser,
    JsonBody(patch): JsonBody<SettingsPatch>,
) -> Result<Json<Value>, ApiError> {
    if !patch.is_empty() {
        app.db
            .update_settings(&caller.user.id, &patch, app.clock.now_ms())
            .await?;
    }
    Ok(Json(json!({ "ok": true })))
}

/// `POST /api/webapp/connect`: issue a pairing code for the caller.
pub async fn connect(
    State(app): State<AppState>,
    caller: WebappUser,
) -> Result<Json<Value>, ApiError> {
    let code = app.pairing.issue_code(&caller.user.id).await?;
    Ok(Json(json!({
        "ok": true,
        "code": code.code,
        "expires_at": code.expires_at,
    })))
}
