//! Timing configuration for the `AniPilot` sync relay.
//!
//! Resolution order:
//! 1. Built-in defaults
//! 2. Optional JSON file (`--timing-config`), any subset of fields
//! 3. Environment variables (`ANIPILOT_<FIELD>` in upper case)

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Every interval the sync subsystem enforces, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// An agent is reachable only if its last heartbeat is younger than this.
    pub reachable_window_ms: i64,
    /// Heartbeat age after which the liveness sweep declares an agent offline.
    pub offline_threshold_ms: i64,
    /// Minimum spacing between two liveness sweeps in one process.
    pub sweep_interval_ms: i64,
    /// Commands older than this are garbage-collected, acknowledged or not.
    pub command_retention_ms: i64,
    /// Notification log rows older than this are garbage-collected.
    pub notification_retention_ms: i64,
    /// Minimum spacing between two notifications of one type to one user.
    pub notification_cooldown_ms: i64,
    pub credential_cache_ttl_ms: i64,
    pub credential_cache_sweep_ms: i64,
    pub pairing_code_ttl_ms: i64,
    /// Lifetime of an issued agent credential.
    pub credential_lifetime_ms: i64,
    /// Maximum commands returned by one poll.
    pub poll_limit: i64,
    /// Maximum watch-history entries kept per user.
    pub history_cap: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reachable_window_ms: 2 * MINUTE_MS,
            offline_threshold_ms: 10 * MINUTE_MS,
            sweep_interval_ms: MINUTE_MS,
            command_retention_ms: HOUR_MS,
            notification_retention_ms: DAY_MS,
            notification_cooldown_ms: 5 * MINUTE_MS,
            credential_cache_ttl_ms: MINUTE_MS,
            credential_cache_sweep_ms: 2 * MINUTE_MS,
            pairing_code_ttl_ms: 5 * MINUTE_MS,
            credential_lifetime_ms: 30 * DAY_MS,
            poll_limit: 10,
            history_cap: 50,
        }
    }
}

impl TimingConfig {
    /// Check that every interval is positive.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("reachable_window_ms", self.reachable_window_ms),
            ("offline_threshold_ms", self.offline_threshold_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("command_retention_ms", self.command_retention_ms),
            ("notification_retention_ms", self.notification_retention_ms),
            ("notification_cooldown_ms", self.notification_cooldown_ms),
            ("credential_cache_ttl_ms", self.credential_cache_ttl_ms),
            ("credential_cache_sweep_ms", self.credential_cache_sweep_ms),
            ("pairing_code_ttl_ms", self.pairing_code_ttl_ms),
            ("credential_lifetime_ms", self.credential_lifetime_ms),
            ("poll_limit", self.poll_limit),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v <= 0) {
            return Err(Error::Config(format!("{name} must be positive")));
        }
        Ok(())
    }
}

/// Load timing configuration from defaults, an optional file, and the environment.
pub fn load_timing_config(path: Option<&Path>) -> Result<TimingConfig> {
    let mut config = match path {
        Some(path) => load_config_file(path)?,
        None => TimingConfig::default(),
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

fn load_config_file(path: &Path) -> Result<TimingConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    parse_config(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file {}: {e}", path.display())))
}

fn parse_config(content: &str) -> Result<TimingConfig> {
    Ok(serde_json::from_str(content)?)
}

fn override_from<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) {
    if let Some(value) = lookup(name).and_then(|v| v.trim().parse().ok()) {
        *target = value;
    }
}

/// Apply `ANIPILOT_<FIELD>` overrides. Unparseable values are ignored.
fn apply_env_overrides(config: &mut TimingConfig, lookup: impl Fn(&str) -> Option<String>) {
    let l = &lookup;
    override_from(l, "ANIPILOT_REACHABLE_WINDOW_MS", &mut config.reachable_window_ms);
    override_from(l, "ANIPILOT_OFFLINE_THRESHOLD_MS", &mut config.offline_threshold_ms);
    override_from(l, "ANIPILOT_SWEEP_INTERVAL_MS", &mut config.sweep_interval_ms);
    override_from(l, "ANIPILOT_COMMAND_RETENTION_MS", &mut config.command_retention_ms);
    override_from(
        l,
        "ANIPILOT_NOTIFICATION_RETENTION_MS",
        &mut config.notification_retention_ms,
    );
    override_from(
        l,
        "ANIPILOT_NOTIFICATION_COOLDOWN_MS",
        &mut config.notification_cooldown_ms,
    );
    override_from(
        l,
        "ANIPILOT_CREDENTIAL_CACHE_TTL_MS",
        &mut config.credential_cache_ttl_ms,
    );
    override_from(
        l,
        "ANIPILOT_CREDENTIAL_CACHE_SWEEP_MS",
        &mut config.credential_cache_sweep_ms,
    );
    override_from(l, "ANIPILOT_PAIRING_CODE_TTL_MS", &mut config.pairing_code_ttl_ms);
    override_from(
        l,
        "ANIPILOT_CREDENTIAL_LIFETIME_MS",
        &mut config.credential_lifetime_ms,
    );
    override_from(l, "ANIPILOT_POLL_LIMIT", &mut config.poll_limit);
    override_from(l, "ANIPILOT_HISTORY_CAP", &mut config.history_cap);
}
