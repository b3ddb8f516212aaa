//! Tests for the session-authenticated control-plane endpoints.

use anipilot_core::Clock;
use axum::http::StatusCode;
use serde_json::json;

use super::extract::INIT_DATA_HEADER;
use super::test_helpers::{TestApp, bearer, get, post_json, test_app};
use crate::storage::StatePatch;

fn session(app: &TestApp, chat_id: i64) -> String {
    app.init_data(chat_id, "alice")
}

#[tokio::test]
async fn missing_session_is_unauthorized() {
    let app = test_app().await;
    let (status, body) = app.send(get("/api/webapp/state", &[])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn tampered_session_is_unauthorized() {
    let app = test_app().await;
    let signed = session(&app, 7);
    let tampered = signed.replace("alice", "mallory");
    let (status, _) = app
        .send(get("/api/webapp/state", &[(INIT_DATA_HEADER, &tampered)]))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_from_another_bot_is_unauthorized() {
    let app = test_app().await;
    let other = crate::auth::InitDataValidator::new("999:other-bot");
    let user = json!({"id": 7, "username": "alice"}).to_string();
    let forged = other.sign(&[("auth_date", "1700000000"), ("user", &user)]);
    let (status, _) = app
        .send(get("/api/webapp/state", &[(INIT_DATA_HEADER, &forged)]))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_contact_creates_user_without_state() {
    let app = test_app().await;
    let init = session(&app, 7);
    let (status, body) = app
        .send(get("/api/webapp/state", &[(INIT_DATA_HEADER, &init)]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(body["state"].is_null());
    assert_eq!(body["user"]["username"], "alice");

    let user = app.state.db.get_user_by_chat(7).await.unwrap().unwrap();
    assert_eq!(body["user"]["id"], user.id.as_str());
}

#[tokio::test]
async fn state_reports_reachability() {
    let app = test_app().await;
    let init = session(&app, 7);
    let user = app.state.db.get_or_create_user(7, "alice", app.clock.now_ms()).await.unwrap();
    let patch = StatePatch {
        episode: Some(5),
        ..StatePatch::default()
    };
    app.state.sync.record_heartbeat(&user.id, patch).await.unwrap();

    let (_, body) = app
        .send(get("/api/webapp/state", &[(INIT_DATA_HEADER, &init)]))
        .await;
    assert_eq!(body["state"]["current_episode"], 5);
    assert_eq!(body["state"]["agent_reachable"], true);

    app.clock.advance(120_000);
    let (_, body) = app
        .send(get("/api/webapp/state", &[(INIT_DATA_HEADER, &init)]))
        .await;
    assert_eq!(body["state"]["online"], true);
    assert_eq!(body["state"]["agent_reachable"], false);
}

#[tokio::test]
async fn command_requires_type() {
    let app = test_app().await;
    let init = session(&app, 7);
    let (status, body) = app
        .send(post_json(
            "/api/webapp/command",
            &[(INIT_DATA_HEADER, &init)],
            &json!({"payload": {}}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No type");
}

#[tokio::test]
async fn command_is_queued_even_when_agent_unreachable() {
    let app = test_app().await;
    let init = session(&app, 7);
    let (status, body) = app
        .send(post_json(
            "/api/webapp/command",
            &[(INIT_DATA_HEADER, &init)],
            &json!({"type": "navigate", "payload": {"url": "https://x"}}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_reachable"], false);
    assert!(body["id"].is_i64());

    let user = app.state.db.get_user_by_chat(7).await.unwrap().unwrap();
    let pending = app.state.sync.poll_pending(&user.id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].command_type, "navigate");
    assert!(app.sink.sent().is_empty());
}

#[tokio::test]
async fn queued_command_survives_unreadable_state() {
    let app = test_app().await;
    let init = session(&app, 7);
    let user = app.state.db.get_or_create_user(7, "alice", app.clock.now_ms()).await.unwrap();
    sqlx::query("UPDATE sync_state SET marathon_queue = 'not json' WHERE user_id = ?")
        .bind(&user.id)
        .execute(app.state.db.pool())
        .await
        .unwrap();

    let (status, body) = app
        .send(post_json(
            "/api/webapp/command",
            &[(INIT_DATA_HEADER, &init)],
            &json!({"type": "play"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_reachable"], false);
    assert_eq!(app.state.db.count_commands(&user.id).await.unwrap(), 1);
}

#[tokio::test]
async fn command_reaches_paired_agent() {
    let app = test_app().await;
    let (user_id, token) = app.pair_agent(7).await;
    let auth = bearer(&token);
    app.send(post_json("/api/heartbeat", &[("authorization", &auth)], &json!({})))
        .await;

    let init = session(&app, 7);
    let (_, body) = app
        .send(post_json(
            "/api/webapp/command",
            &[(INIT_DATA_HEADER, &init)],
            &json!({"type": "pause"}),
        ))
        .await;
    assert_eq!(body["agent_reachable"], true);

    let (_, body) = app
        .send(get("/api/commands", &[("authorization", &auth)]))
        .await;
    assert_eq!(body["commands"][0]["type"], "pause");
    assert_eq!(body["commands"][0]["payload"], json!({}));
    assert_eq!(body["commands"][0]["user_id"], user_id.as_str());
}

#[tokio::test]
async fn marathon_add_reports_duplicates() {
    let app = test_app().await;
    let init = session(&app, 7);
    let add = json!({"action": "add", "payload": {"id": 42, "title": "Mushishi"}});

    let (status, body) = app
        .send(post_json("/api/webapp/marathon", &[(INIT_DATA_HEADER, &init)], &add))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("msg").is_none());

    let (_, body) = app
        .send(post_json("/api/webapp/marathon", &[(INIT_DATA_HEADER, &init)], &add))
        .await;
    assert_eq!(body["msg"], "exists");

    let user = app.state.db.get_user_by_chat(7).await.unwrap().unwrap();
    let state = app.state.db.get_state(&user.id).await.unwrap().unwrap();
    assert_eq!(state.marathon_queue.len(), 1);
    assert_eq!(state.marathon_queue[0].title.as_deref(), Some("Mushishi"));
}

#[tokio::test]
async fn marathon_clear_resets_queue() {
    let app = test_app().await;
    let init = session(&app, 7);
    for id in [1, 2] {
        app.send(post_json(
            "/api/webapp/marathon",
            &[(INIT_DATA_HEADER, &init)],
            &json!({"action": "add", "payload": {"id": id}}),
        ))
        .await;
    }
    let (status, _) = app
        .send(post_json(
            "/api/webapp/marathon",
            &[(INIT_DATA_HEADER, &init)],
            &json!({"action": "clear"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let user = app.state.db.get_user_by_chat(7).await.unwrap().unwrap();
    let state = app.state.db.get_state(&user.id).await.unwrap().unwrap();
    assert!(state.marathon_queue.is_empty());
    assert!(!state.marathon_on);
    assert_eq!(state.marathon_idx, 0);
}

#[tokio::test]
async fn marathon_rejects_missing_or_unknown_action() {
    let app = test_app().await;
    let init = session(&app, 7);

    let (status, body) = app
        .send(post_json("/api/webapp/marathon", &[(INIT_DATA_HEADER, &init)], &json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No action");

    let (status, _) = app
        .send(post_json(
            "/api/webapp/marathon",
            &[(INIT_DATA_HEADER, &init)],
            &json!({"action": "shuffle"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settings_defaults_and_partial_save() {
    let app = test_app().await;
    let init = session(&app, 7);

    let (_, body) = app
        .send(get("/api/webapp/settings", &[(INIT_DATA_HEADER, &init)]))
        .await;
    assert_eq!(body["connected"], false);
    assert_eq!(
        body["settings"],
        json!({
            "notify_crash": true,
            "notify_marathon": true,
            "notify_offline": true,
            "notify_digest": false,
        })
    );

    let (status, _) = app
        .send(post_json(
            "/api/webapp/settings",
            &[(INIT_DATA_HEADER, &init)],
            &json!({"notify_offline": false}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .send(get("/api/webapp/settings", &[(INIT_DATA_HEADER, &init)]))
        .await;
    assert_eq!(body["settings"]["notify_offline"], false);
    assert_eq!(body["settings"]["notify_crash"], true);
}

#[tokio::test]
async fn connect_code_pairs_an_agent() {
    let app = test_app().await;
    let init = session(&app, 7);

    let (status, body) = app
        .send(post_json("/api/webapp/connect", &[(INIT_DATA_HEADER, &init)], &json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let code = body["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 7);
    assert_eq!(body["expires_at"], app.clock.now_ms() + 5 * 60_000);

    let (status, body) = app
        .send(post_json("/api/auth/verify", &[], &json!({"code": code})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chatId"], 7);

    let (_, body) = app
        .send(get("/api/webapp/settings", &[(INIT_DATA_HEADER, &init)]))
        .await;
    assert_eq!(body["connected"], true);
}
