//! `AniPilot` Relay Server
//!
//! HTTP relay between playback agents and the chat control plane.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anipilot_core::SystemClock;
use anipilot_core::config::load_timing_config;
use anipilot_core::tracing_init::{LogFormat, init_tracing};
use clap::Parser;
use tracing::info;

use anipilot_relay::notifications::TelegramSink;
use anipilot_relay::notifications::sink::DEFAULT_API_BASE;
use anipilot_relay::server::{AppState, Secrets, build_router};
use anipilot_relay::storage::RelayDatabase;

#[derive(Parser, Debug)]
#[command(name = "anipilot-relay")]
#[command(
    version,
    about = "AniPilot relay server - agent sync, command queue, and notifications"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "ANIPILOT_ADDR", default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Path to SQLite database file.
    #[arg(long, env = "ANIPILOT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Secret used to sign agent credentials.
    #[arg(long, env = "ANIPILOT_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Chat bot token. Used for delivery and to verify control-plane sessions.
    #[arg(long, env = "ANIPILOT_BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    /// Base URL of the chat bot API.
    #[arg(long, env = "ANIPILOT_BOT_API", default_value = DEFAULT_API_BASE)]
    bot_api: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    request_timeout: u64,

    /// Timeout for outbound notification requests in seconds.
    #[arg(long, default_value_t = 10)]
    notify_timeout: u64,

    /// JSON file overriding any of the timing defaults.
    #[arg(long)]
    timing_config: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(
        "anipilot_relay=info,tower_http=warn",
        LogFormat::from_json_flag(args.log_json),
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting anipilot-relay"
    );

    let timing = load_timing_config(args.timing_config.as_deref())?;

    let db_path = match args.db_path {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening relay database");
    let db = RelayDatabase::open(&db_path).await?;

    let sink = Arc::new(TelegramSink::new(
        &args.bot_api,
        &args.bot_token,
        Duration::from_secs(args.notify_timeout),
    )?);
    let secrets = Secrets {
        jwt_secret: args.jwt_secret,
        bot_token: args.bot_token,
    };
    let state = AppState::new(db, Arc::new(SystemClock), sink, &timing, &secrets);

    let sweep_every = u64::try_from(timing.credential_cache_sweep_ms).unwrap_or(120_000);
    let _sweeper = state.cache.spawn_sweeper(Duration::from_millis(sweep_every));

    let app = build_router(state, Duration::from_secs(args.request_timeout));
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "Relay listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Relay stopped");
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".anipilot").join("relay.db"))
}
