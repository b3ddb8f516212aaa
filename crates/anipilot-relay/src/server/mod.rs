//! HTTP server for `AniPilot` relay.
//!
//! Agents use the bearer-authenticated `/api/*` endpoints, the control plane
//! the session-authenticated `/api/webapp/*` ones. Every `/api` request
//! nudges the liveness monitor.

pub mod agent_routes;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod webapp_routes;

#[cfg(test)]
mod agent_routes_tests;
#[cfg(test)]
mod test_helpers;
#[cfg(test)]
mod webapp_routes_tests;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Duration;

use anipilot_core::{Clock, TimingConfig};
use axum::extract::State;
use axum::http::{HeaderName, Method, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{
    AgentAuthenticator, CredentialCache, InitDataValidator, JwtManager, PairingService,
};
use crate::liveness::LivenessMonitor;
use crate::marathon::MarathonService;
use crate::notifications::{NotificationDispatcher, NotificationSink};
use crate::storage::RelayDatabase;
use crate::sync::SyncService;

/// Secrets the relay is started with.
pub struct Secrets {
    /// Signs agent credentials.
    pub jwt_secret: String,
    /// Chat bot token; also the root of the session-proof secret.
    pub bot_token: String,
}

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: RelayDatabase,
    pub clock: Arc<dyn Clock>,
    pub cache: Arc<CredentialCache>,
    pub agent_auth: Arc<AgentAuthenticator>,
    pub sessions: Arc<InitDataValidator>,
    pub pairing: Arc<PairingService>,
    pub sync: Arc<SyncService>,
    pub marathon: Arc<MarathonService>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub liveness: Arc<LivenessMonitor>,
}

impl AppState {
    /// Wire every component once, sharing one clock and one database.
    pub fn new(
        db: RelayDatabase,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        timing: &TimingConfig,
        secrets: &Secrets,
    ) -> Self {
        let jwt = Arc::new(JwtManager::new(
            secrets.jwt_secret.as_bytes(),
            timing.credential_lifetime_ms,
        ));
        let cache = Arc::new(CredentialCache::new(
            Arc::clone(&clock),
            timing.credential_cache_ttl_ms,
        ));
        let agent_auth = Arc::new(AgentAuthenticator::new(
            db.clone(),
            Arc::clone(&jwt),
            Arc::clone(&cache),
            Arc::clone(&clock),
        ));
        let pairing = Arc::new(PairingService::new(
            db.clone(),
            jwt,
            Arc::clone(&cache),
            Arc::clone(&clock),
            timing.pairing_code_ttl_ms,
        ));
        let sync = Arc::new(SyncService::new(db.clone(), Arc::clone(&clock), timing));
        let marathon = Arc::new(MarathonService::new(
            db.clone(),
            Arc::clone(&sync),
            Arc::clone(&clock),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            db.clone(),
            sink,
            Arc::clone(&clock),
            timing.notification_cooldown_ms,
        ));
        let liveness = Arc::new(LivenessMonitor::new(
            db.clone(),
            Arc::clone(&dispatcher),
            Arc::clone(&clock),
            timing,
        ));

        Self {
            db,
            clock,
            cache,
            agent_auth,
            sessions: Arc::new(InitDataValidator::new(&secrets.bot_token)),
            pairing,
            sync,
            marathon,
            dispatcher,
            liveness,
        }
    }
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "ok": true, "ts": state.clock.now_ms() }))
}

/// Build the full router.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route("/auth/verify", post(agent_routes::verify))
        .route("/heartbeat", post(agent_routes::heartbeat))
        .route("/commands", get(agent_routes::commands))
        .route("/commands/{id}/done", post(agent_routes::command_done))
        .route("/event", post(agent_routes::event))
        .route("/offline", post(agent_routes::offline))
        .route("/logout", post(agent_routes::logout))
        .route("/webapp/state", get(webapp_routes::state))
        .route("/webapp/command", post(webapp_routes::command))
        .route("/webapp/marathon", post(webapp_routes::marathon))
        .route(
            "/webapp/settings",
            get(webapp_routes::get_settings).post(webapp_routes::save_settings),
        )
        .route("/webapp/connect", post(webapp_routes::connect))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::trigger_liveness,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(extract::INIT_DATA_HEADER),
        ]);

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .layer(axum::middleware::from_fn_with_state(
            request_timeout,
            middleware::enforce_timeout,
        ))
        .layer(cors)
        .with_state(state)
}
