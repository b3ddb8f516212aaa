//! Tracing/logging initialization for `AniPilot` binaries.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Text,
    /// One JSON object per event, for log aggregation.
    Json,
}

impl LogFormat {
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// Build the env filter, preferring `RUST_LOG` over `default_filter`.
///
/// An unparseable `RUST_LOG` falls back to `default_filter` instead of
/// silencing every target.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- directive used when `RUST_LOG` is unset or invalid
///   (e.g. `"anipilot_relay=info,tower_http=warn"`).
/// * `format` -- text or JSON lines.
pub fn init_tracing(default_filter: &str, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(env_filter(default_filter));
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}
