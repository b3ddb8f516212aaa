//! Opportunistic liveness sweep.
//!
//! There is no timer driving the sweep: every incoming API request calls
//! [`LivenessMonitor::trigger`], and a throttle lets at most one sweep start
//! per interval. A sweep flips agents that went silent to offline, alerts
//! their users once, and garbage-collects old commands and ledger rows.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use anipilot_core::db::DatabaseError;
use anipilot_core::{Clock, TimingConfig};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::notifications::{NotificationDispatcher, NotificationKind};
use crate::storage::RelayDatabase;

/// Lets one caller through per interval.
#[derive(Debug)]
pub struct SweepThrottle {
    last_run: AtomicI64,
    interval_ms: i64,
}

impl SweepThrottle {
    pub const fn new(interval_ms: i64) -> Self {
        Self {
            last_run: AtomicI64::new(i64::MIN),
            interval_ms,
        }
    }

    /// Claim the current window. Returns `false` if a run already started
    /// within the interval.
    pub fn try_acquire(&self, now_ms: i64) -> bool {
        let last = self.last_run.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) < self.interval_ms {
            return false;
        }
        self.last_run
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub marked_offline: usize,
    pub commands_purged: u64,
    pub notifications_purged: u64,
}

pub struct LivenessMonitor {
    db: RelayDatabase,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    throttle: SweepThrottle,
    offline_threshold_ms: i64,
    command_retention_ms: i64,
    notification_retention_ms: i64,
}

impl LivenessMonitor {
    pub fn new(
        db: RelayDatabase,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            db,
            dispatcher,
            clock,
            throttle: SweepThrottle::new(timing.sweep_interval_ms),
            offline_threshold_ms: timing.offline_threshold_ms,
            command_retention_ms: timing.command_retention_ms,
            notification_retention_ms: timing.notification_retention_ms,
        }
    }

    /// Start a sweep in the background if one is due.
    ///
    /// Returns the task handle when a sweep was started. Failures are logged
    /// and the next window retries.
    pub fn trigger(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.throttle.try_acquire(self.clock.now_ms()) {
            return None;
        }
        let monitor = Arc::clone(self);
        Some(tokio::spawn(async move {
            match monitor.run_sweep().await {
                Ok(report) if report != SweepReport::default() => {
                    info!(
                        marked_offline = report.marked_offline,
                        commands_purged = report.commands_purged,
                        notifications_purged = report.notifications_purged,
                        "Liveness sweep completed"
                    );
                }
                Ok(_) => debug!("Liveness sweep found nothing to do"),
                Err(e) => warn!(error = %e, "Liveness sweep failed"),
            }
        }))
    }

    /// One unthrottled sweep.
    ///
    /// Each stale agent is alerted and then marked offline with the alert
    /// flag set, so it is not selected again until a heartbeat re-arms it.
    /// Running two sweeps concurrently is harmless.
    pub async fn run_sweep(&self) -> Result<SweepReport, DatabaseError> {
        let now = self.clock.now_ms();
        let stale_before = now - self.offline_threshold_ms;
        let mut report = SweepReport::default();

        for state in self.db.get_stale_online(stale_before).await? {
            let payload = json!({ "title": state.current_title() });
            self.dispatcher
                .send(
                    &state.user_id,
                    NotificationKind::ScriptOffline.as_str(),
                    &payload,
                )
                .await;

            match self
                .db
                .mark_offline_notified(&state.user_id, stale_before, now)
                .await
            {
                Ok(true) => {
                    report.marked_offline += 1;
                    info!(
                        user_id = %state.user_id,
                        last_heartbeat = state.last_heartbeat,
                        "Agent marked offline"
                    );
                }
                Ok(false) => debug!(user_id = %state.user_id, "Agent came back during sweep"),
                Err(e) => {
                    warn!(user_id = %state.user_id, error = %e, "Failed to mark agent offline");
                }
            }
        }

        report.commands_purged = self
            .db
            .purge_commands_before(now - self.command_retention_ms)
            .await?;
        report.notifications_purged = self
            .db
            .purge_notifications_before(now - self.notification_retention_ms)
            .await?;

        Ok(report)
    }
}
