//! Shared setup for the HTTP route test modules.

use std::sync::Arc;
use std::time::Duration;

use anipilot_core::{ManualClock, TimingConfig};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{AppState, Secrets, build_router};
use crate::notifications::sink::RecordingSink;
use crate::storage::RelayDatabase;

pub const T0: i64 = 1_800_000_000_000;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
}

pub async fn test_app() -> TestApp {
    let db = RelayDatabase::open_in_memory().await.unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let sink = Arc::new(RecordingSink::default());
    let secrets = Secrets {
        jwt_secret: "test-jwt-secret".into(),
        bot_token: "123456:test-bot".into(),
    };
    let state = AppState::new(
        db,
        clock.clone(),
        sink.clone(),
        &TimingConfig::default(),
        &secrets,
    );
    let router = build_router(state.clone(), Duration::from_secs(5));
    TestApp {
        router,
        state,
        clock,
        sink,
    }
}

impl TestApp {
    /// Send a request and return (status, JSON body).
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    /// Signed session parameters for a chat user.
    pub fn init_data(&self, chat_id: i64, username: &str) -> String {
        let user = json!({ "id": chat_id, "username": username }).to_string();
        self.state
            .sessions
            .sign(&[("auth_date", "1700000000"), ("user", &user)])
    }

    /// Create a user and pair an agent for it. Returns (user id, credential).
    pub async fn pair_agent(&self, chat_id: i64) -> (String, String) {
        let user = self
            .state
            .db
            .get_or_create_user(chat_id, "alice", T0)
            .await
            .unwrap();
        let code = self.state.pairing.issue_code(&user.id).await.unwrap();
        let redeemed = self.state.pairing.redeem(&code.code).await.unwrap();
        (user.id, redeemed.token)
    }

    /// Wait for background notification tasks to deliver `count` messages.
    pub async fn wait_for_sent(&self, count: usize) {
        for _ in 0..200 {
            if self.sink.sent().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {count} notifications, got {}",
            self.sink.sent().len()
        );
    }
}

pub fn get(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    for &(name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, headers: &[(&str, &str)], body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for &(name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn post_empty(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    for &(name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
