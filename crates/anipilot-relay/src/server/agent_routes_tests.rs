//! Tests for the agent-facing HTTP endpoints.

use axum::http::StatusCode;
use serde_json::json;

use super::extract::INIT_DATA_HEADER;
use super::test_helpers::{T0, bearer, get, post_empty, post_json, test_app};
use crate::storage::StatePatch;

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app().await;
    let (status, body) = app.send(get("/health", &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["ts"], T0);
}

#[tokio::test]
async fn verify_requires_code() {
    let app = test_app().await;
    let (status, body) = app
        .send(post_json("/api/auth/verify", &[], &json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "No code"}));
}

#[tokio::test]
async fn verify_unknown_code_is_not_found() {
    let app = test_app().await;
    let (status, _) = app
        .send(post_json("/api/auth/verify", &[], &json!({"code": "ZZZ-ZZZ"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn verify_issues_credential_and_announces_link() {
    let app = test_app().await;
    let user = app.state.db.get_or_create_user(55, "alice", T0).await.unwrap();
    let code = app.state.pairing.issue_code(&user.id).await.unwrap();

    let sloppy = format!(" {} ", code.code.to_lowercase());
    let (status, body) = app
        .send(post_json("/api/auth/verify", &[], &json!({"code": sloppy})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chatId"], 55);
    assert_eq!(body["username"], "alice");

    let token = body["token"].as_str().unwrap();
    let auth = bearer(token);
    let (status, _) = app
        .send(get("/api/commands", &[("authorization", &auth)]))
        .await;
    assert_eq!(status, StatusCode::OK);

    app.wait_for_sent(1).await;
    assert_eq!(app.sink.sent()[0].0, 55);

    // Consumed.
    let (status, _) = app
        .send(post_json("/api/auth/verify", &[], &json!({"code": code.code})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn agent_endpoints_require_credential() {
    let app = test_app().await;
    let (status, body) = app.send(get("/api/commands", &[])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = app
        .send(get("/api/commands", &[("authorization", "Bearer not-a-jwt")]))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn heartbeat_merges_state() {
    let app = test_app().await;
    let (user_id, token) = app.pair_agent(1).await;
    let auth = bearer(&token);

    let (status, _) = app
        .send(post_json(
            "/api/heartbeat",
            &[("authorization", &auth)],
            &json!({"state": {"episode": 3, "season": 1, "videoTime": 42.0}}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    app.send(post_json(
        "/api/heartbeat",
        &[("authorization", &auth)],
        &json!({"state": {"episode": 4}}),
    ))
    .await;

    let state = app.state.db.get_state(&user_id).await.unwrap().unwrap();
    assert!(state.online);
    assert_eq!(state.current_season, Some(1));
    assert_eq!(state.current_episode, Some(4));
    assert!((state.video_time - 42.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn heartbeat_without_state_only_touches_liveness() {
    let app = test_app().await;
    let (user_id, token) = app.pair_agent(1).await;
    let (status, _) = app
        .send(post_json(
            "/api/heartbeat",
            &[("authorization", &bearer(&token))],
            &json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let state = app.state.db.get_state(&user_id).await.unwrap().unwrap();
    assert!(state.online);
    assert_eq!(state.last_heartbeat, T0);
}

#[tokio::test]
async fn heartbeat_with_bad_cursor_still_counts() {
    let app = test_app().await;
    let (user_id, token) = app.pair_agent(1).await;
    let (status, _) = app
        .send(post_json(
            "/api/heartbeat",
            &[("authorization", &bearer(&token))],
            &json!({"state": {
                "marathonOn": true,
                "marathonIdx": 0,
                "marathonQueue": [],
                "episode": 2,
            }}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let state = app.state.db.get_state(&user_id).await.unwrap().unwrap();
    assert!(state.online);
    assert_eq!(state.current_episode, Some(2));
    assert!(!state.marathon_on);
    assert_eq!(state.marathon_idx, 0);
}

#[tokio::test]
async fn agent_behind_a_shrunk_queue_stays_online() {
    let app = test_app().await;
    let (user_id, token) = app.pair_agent(1).await;
    let auth = bearer(&token);
    app.send(post_json(
        "/api/heartbeat",
        &[("authorization", &auth)],
        &json!({"state": {
            "marathonQueue": [{"id": 1}, {"id": 2}, {"id": 3}],
            "marathonOn": true,
            "marathonIdx": 2,
        }}),
    ))
    .await;

    let init = app.init_data(1, "alice");
    let (status, _) = app
        .send(post_json(
            "/api/webapp/marathon",
            &[(INIT_DATA_HEADER, &init)],
            &json!({"action": "remove", "payload": {"id": 3}}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    // The agent keeps reporting its old cursor until it applies the sync.
    for _ in 0..11 {
        app.clock.advance(60_000);
        let (status, _) = app
            .send(post_json(
                "/api/heartbeat",
                &[("authorization", &auth)],
                &json!({"state": {"marathonOn": true, "marathonIdx": 2, "episode": 5}}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let report = app.state.liveness.run_sweep().await.unwrap();
    assert_eq!(report.marked_offline, 0);

    let state = app.state.db.get_state(&user_id).await.unwrap().unwrap();
    assert!(state.online);
    assert_eq!(state.current_episode, Some(5));
    assert_eq!(state.marathon_queue.len(), 2);
    assert_eq!(state.marathon_idx, 1);
    assert!(app.sink.sent().is_empty());
}

#[tokio::test]
async fn poll_and_acknowledge() {
    let app = test_app().await;
    let (user_id, token) = app.pair_agent(1).await;
    let auth = bearer(&token);
    let first = app
        .state
        .sync
        .enqueue(&user_id, "navigate", &json!({"url": "https://x"}))
        .await
        .unwrap();
    app.state.sync.enqueue(&user_id, "play", &json!({})).await.unwrap();

    let (_, body) = app
        .send(get("/api/commands", &[("authorization", &auth)]))
        .await;
    let commands = body["commands"].as_array().unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0]["id"], first);
    assert_eq!(commands[0]["type"], "navigate");
    assert_eq!(commands[0]["payload"]["url"], "https://x");

    let (status, _) = app
        .send(post_empty(
            &format!("/api/commands/{first}/done"),
            &[("authorization", &auth)],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app
        .send(get("/api/commands", &[("authorization", &auth)]))
        .await;
    assert_eq!(body["commands"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn acknowledge_other_users_command_is_a_no_op() {
    let app = test_app().await;
    let (alice, _) = app.pair_agent(1).await;
    let (_, bob_token) = app.pair_agent(2).await;
    let id = app.state.sync.enqueue(&alice, "play", &json!({})).await.unwrap();

    let (status, _) = app
        .send(post_empty(
            &format!("/api/commands/{id}/done"),
            &[("authorization", &bearer(&bob_token))],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.state.db.count_commands(&alice).await.unwrap(), 1);
}

#[tokio::test]
async fn acknowledge_rejects_non_numeric_id() {
    let app = test_app().await;
    let (_, token) = app.pair_agent(1).await;
    let (status, _) = app
        .send(post_empty(
            "/api/commands/abc/done",
            &[("authorization", &bearer(&token))],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn offline_clears_flag_only() {
    let app = test_app().await;
    let (user_id, token) = app.pair_agent(1).await;
    let patch = StatePatch {
        episode: Some(9),
        ..StatePatch::default()
    };
    app.state.sync.record_heartbeat(&user_id, patch).await.unwrap();

    let (status, _) = app
        .send(post_empty("/api/offline", &[("authorization", &bearer(&token))]))
        .await;
    assert_eq!(status, StatusCode::OK);

    let state = app.state.db.get_state(&user_id).await.unwrap().unwrap();
    assert!(!state.online);
    assert_eq!(state.current_episode, Some(9));
}

#[tokio::test]
async fn event_requires_type_and_notifies() {
    let app = test_app().await;
    let (_, token) = app.pair_agent(3).await;
    let auth = bearer(&token);

    let (status, _) = app
        .send(post_json("/api/event", &[("authorization", &auth)], &json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(post_json(
            "/api/event",
            &[("authorization", &auth)],
            &json!({
                "type": "video_crash",
                "payload": {"title": "Frieren", "season": 1, "episode": 2},
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    app.wait_for_sent(1).await;
    let (chat, msg) = &app.sink.sent()[0];
    assert_eq!(*chat, 3);
    assert!(msg.text.contains("Frieren S1E2"));
}

#[tokio::test]
async fn event_succeeds_when_delivery_fails() {
    let app = test_app().await;
    let (_, token) = app.pair_agent(3).await;
    app.sink.set_failing(true);

    let (status, _) = app
        .send(post_json(
            "/api/event",
            &[("authorization", &bearer(&token))],
            &json!({"type": "connection_lost"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rotated_credential_stops_working_after_cache_ttl() {
    let app = test_app().await;
    let (user_id, old) = app.pair_agent(1).await;
    let old_auth = bearer(&old);
    let (status, _) = app
        .send(get("/api/commands", &[("authorization", &old_auth)]))
        .await;
    assert_eq!(status, StatusCode::OK);

    let code = app.state.pairing.issue_code(&user_id).await.unwrap();
    let new = app.state.pairing.redeem(&code.code).await.unwrap().token;

    app.clock.advance(60_000);
    let (status, body) = app
        .send(get("/api/commands", &[("authorization", &old_auth)]))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Revoked");

    let (status, _) = app
        .send(get("/api/commands", &[("authorization", &bearer(&new))]))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn logout_revokes_immediately() {
    let app = test_app().await;
    let (user_id, token) = app.pair_agent(1).await;
    let auth = bearer(&token);

    let (status, _) = app
        .send(post_empty("/api/logout", &[("authorization", &auth)]))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(get("/api/commands", &[("authorization", &auth)]))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app.state.db.get_user(&user_id).await.unwrap().token.is_none());
}

#[tokio::test]
async fn api_requests_trigger_liveness_sweep() {
    let app = test_app().await;
    let (user_id, _) = app.pair_agent(4).await;
    app.state
        .sync
        .record_heartbeat(&user_id, StatePatch::default())
        .await
        .unwrap();

    app.clock.advance(11 * 60_000);
    let (_, other) = app.pair_agent(5).await;
    app.send(get("/api/commands", &[("authorization", &bearer(&other))]))
        .await;

    app.wait_for_sent(1).await;
    let sent = app.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 4);
    assert!(sent[0].1.text.contains("disconnected"));
}
