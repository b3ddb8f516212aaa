//! Heartbeats, offline declarations, and the per-user command queue.

use std::sync::Arc;

use anipilot_core::{Clock, TimingConfig};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::SyncError;
use crate::storage::{Command, RelayDatabase, StatePatch, SyncState};

pub struct SyncService {
    db: RelayDatabase,
    clock: Arc<dyn Clock>,
    reachable_window_ms: i64,
    poll_limit: i64,
    history_cap: usize,
}

impl SyncService {
    pub fn new(db: RelayDatabase, clock: Arc<dyn Clock>, timing: &TimingConfig) -> Self {
        Self {
            db,
            clock,
            reachable_window_ms: timing.reachable_window_ms,
            poll_limit: timing.poll_limit,
            history_cap: timing.history_cap,
        }
    }

    /// Merge an agent heartbeat into the user's state.
    ///
    /// Only the fields present in `patch` are written. The liveness fields
    /// are always reset: online, heartbeat now, offline alert re-armed.
    /// A reported marathon cursor that falls outside the stored queue is
    /// clamped, never rejected.
    #[instrument(skip(self, patch))]
    pub async fn record_heartbeat(
        &self,
        user_id: &str,
        mut patch: StatePatch,
    ) -> Result<(), SyncError> {
        let now = self.clock.now_ms();

        if let Some(history) = patch.history.as_mut() {
            history.truncate(self.history_cap);
        }

        if patch.touches_marathon() {
            let mut next = self
                .db
                .get_state(user_id)
                .await?
                .unwrap_or_else(|| SyncState::empty(user_id))
                .merged(&patch);
            if next.clamp_marathon_cursor() {
                warn!(
                    user_id = %user_id,
                    reported_idx = ?patch.marathon_idx,
                    idx = next.marathon_idx,
                    "Marathon cursor out of range, clamped"
                );
                patch.marathon_on = Some(next.marathon_on);
                patch.marathon_idx = Some(next.marathon_idx);
            }
        }

        patch.online = Some(true);
        patch.last_heartbeat = Some(now);
        patch.notified_offline = Some(false);
        self.db.upsert_state(user_id, &patch, now).await?;

        debug!(user_id = %user_id, "Heartbeat recorded");
        Ok(())
    }

    /// Clean shutdown reported by the agent. Other fields are kept.
    #[instrument(skip(self))]
    pub async fn declare_offline(&self, user_id: &str) -> Result<(), SyncError> {
        let patch = StatePatch {
            online: Some(false),
            ..StatePatch::default()
        };
        self.db
            .upsert_state(user_id, &patch, self.clock.now_ms())
            .await?;

        info!(user_id = %user_id, "Agent declared offline");
        Ok(())
    }

    /// Append a command to the user's queue. The payload is passed through
    /// untouched. Returns the command ID.
    #[instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        user_id: &str,
        command_type: &str,
        payload: &Value,
    ) -> Result<i64, SyncError> {
        if command_type.trim().is_empty() {
            return Err(SyncError::Validation("No type".into()));
        }

        let id = self
            .db
            .insert_command(user_id, command_type, payload, self.clock.now_ms())
            .await?;

        info!(
            user_id = %user_id,
            command_id = id,
            command_type = %command_type,
            "Command queued"
        );
        Ok(id)
    }

    /// Oldest-first unacknowledged commands, up to the poll limit.
    pub async fn poll_pending(&self, user_id: &str) -> Result<Vec<Command>, SyncError> {
        Ok(self.db.pending_commands(user_id, self.poll_limit).await?)
    }

    /// Delete a command the agent has executed.
    ///
    /// A command that does not exist or belongs to another user is left
    /// alone; that is not an error.
    #[instrument(skip(self))]
    pub async fn acknowledge(&self, command_id: i64, user_id: &str) -> Result<bool, SyncError> {
        let removed = self.db.delete_command(command_id, user_id).await?;
        if !removed {
            debug!(user_id = %user_id, command_id, "Acknowledged unknown command");
        }
        Ok(removed)
    }

    pub async fn state(&self, user_id: &str) -> Result<Option<SyncState>, SyncError> {
        Ok(self.db.get_state(user_id).await?)
    }

    /// Reachability of a loaded state, against the current time.
    pub fn reachable(&self, state: &SyncState) -> bool {
        state.is_reachable(self.clock.now_ms(), self.reachable_window_ms)
    }

    /// Whether the user's agent can be expected to pick up a command soon.
    pub async fn is_reachable(&self, user_id: &str) -> Result<bool, SyncError> {
        Ok(self
            .db
            .get_state(user_id)
            .await?
            .is_some_and(|state| self.reachable(&state)))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{ItemId, MediaItem};
    use anipilot_core::ManualClock;
    use serde_json::json;

    const T0: i64 = 1_800_000_000_000;

    async fn setup() -> (SyncService, RelayDatabase, Arc<ManualClock>, String) {
        let db = RelayDatabase::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        let user = db.get_or_create_user(1, "alice", T0).await.unwrap();
        let svc = SyncService::new(db.clone(), clock.clone(), &TimingConfig::default());
        (svc, db, clock, user.id)
    }

    fn heartbeat(value: serde_json::Value) -> StatePatch {
        serde_json::from_value(value).unwrap()
    }

    fn item(id: i64) -> MediaItem {
        MediaItem {
            id: Some(ItemId::Num(id)),
            title: Some(format!("Show {id}")),
            ..MediaItem::default()
        }
    }

    #[test]
    fn heartbeat_payload_uses_camel_case_and_ignores_nulls() {
        let patch = heartbeat(json!({
            "videoTime": 12.5,
            "marathonOn": null,
            "watchMinutes": 30,
            "online": false,
        }));
        assert_eq!(patch.video_time, Some(12.5));
        assert_eq!(patch.marathon_on, None);
        assert_eq!(patch.watch_minutes, Some(30));
        assert_eq!(patch.online, None);
    }

    #[tokio::test]
    async fn heartbeat_merges_partially() {
        let (svc, _db, _clock, user) = setup().await;
        svc.record_heartbeat(&user, heartbeat(json!({"episode": 3, "season": 1})))
            .await
            .unwrap();
        svc.record_heartbeat(&user, heartbeat(json!({"episode": 4})))
            .await
            .unwrap();

        let state = svc.state(&user).await.unwrap().unwrap();
        assert_eq!(state.current_episode, Some(4));
        assert_eq!(state.current_season, Some(1));
    }

    #[tokio::test]
    async fn heartbeat_resets_liveness_fields() {
        let (svc, db, clock, user) = setup().await;
        db.mark_offline_notified(&user, i64::MAX, T0).await.unwrap();

        clock.advance(5_000);
        svc.record_heartbeat(&user, StatePatch::default()).await.unwrap();

        let state = svc.state(&user).await.unwrap().unwrap();
        assert!(state.online);
        assert!(!state.notified_offline);
        assert_eq!(state.last_heartbeat, T0 + 5_000);
    }

    #[tokio::test]
    async fn reachability_needs_recent_heartbeat() {
        let (svc, _db, clock, user) = setup().await;
        assert!(!svc.is_reachable(&user).await.unwrap());

        svc.record_heartbeat(&user, StatePatch::default()).await.unwrap();
        assert!(svc.is_reachable(&user).await.unwrap());

        clock.advance(119_999);
        assert!(svc.is_reachable(&user).await.unwrap());

        // Still flagged online, but silent for the full window.
        clock.advance(1);
        assert!(svc.state(&user).await.unwrap().unwrap().online);
        assert!(!svc.is_reachable(&user).await.unwrap());
    }

    #[tokio::test]
    async fn declare_offline_keeps_playback_fields() {
        let (svc, _db, _clock, user) = setup().await;
        svc.record_heartbeat(&user, heartbeat(json!({"episode": 7, "playing": true})))
            .await
            .unwrap();
        svc.declare_offline(&user).await.unwrap();

        let state = svc.state(&user).await.unwrap().unwrap();
        assert!(!state.online);
        assert_eq!(state.current_episode, Some(7));
        assert!(state.playing);
        assert!(!svc.is_reachable(&user).await.unwrap());
    }

    #[tokio::test]
    async fn history_is_capped() {
        let (svc, _db, _clock, user) = setup().await;
        let history: Vec<_> = (0..80).map(|i| json!({"title": i})).collect();
        svc.record_heartbeat(&user, heartbeat(json!({"history": history})))
            .await
            .unwrap();

        let state = svc.state(&user).await.unwrap().unwrap();
        assert_eq!(state.history.len(), 50);
        assert_eq!(state.history[0], json!({"title": 0}));
    }

    #[tokio::test]
    async fn out_of_range_marathon_cursor_is_clamped() {
        let (svc, _db, _clock, user) = setup().await;
        let patch = StatePatch {
            marathon_queue: Some(vec![item(1), item(2)]),
            marathon_on: Some(true),
            marathon_idx: Some(2),
            episode: Some(4),
            ..StatePatch::default()
        };
        svc.record_heartbeat(&user, patch).await.unwrap();

        let state = svc.state(&user).await.unwrap().unwrap();
        assert!(state.online);
        assert_eq!(state.last_heartbeat, T0);
        assert_eq!(state.current_episode, Some(4));
        assert_eq!(state.marathon_queue.len(), 2);
        assert!(state.marathon_on);
        assert_eq!(state.marathon_idx, 1);
    }

    #[tokio::test]
    async fn running_marathon_on_empty_queue_is_stopped() {
        let (svc, _db, _clock, user) = setup().await;
        let patch = heartbeat(json!({"marathonOn": true, "marathonIdx": 3}));
        svc.record_heartbeat(&user, patch).await.unwrap();

        let state = svc.state(&user).await.unwrap().unwrap();
        assert!(state.online);
        assert!(!state.marathon_on);
        assert_eq!(state.marathon_idx, 0);
    }

    #[tokio::test]
    async fn cursor_is_checked_against_stored_queue() {
        let (svc, _db, _clock, user) = setup().await;
        let queue = StatePatch {
            marathon_queue: Some(vec![item(1), item(2)]),
            ..StatePatch::default()
        };
        svc.record_heartbeat(&user, queue).await.unwrap();

        let running = StatePatch {
            marathon_on: Some(true),
            marathon_idx: Some(1),
            ..StatePatch::default()
        };
        svc.record_heartbeat(&user, running).await.unwrap();

        let state = svc.state(&user).await.unwrap().unwrap();
        assert!(state.marathon_on);
        assert_eq!(state.marathon_idx, 1);
    }

    #[tokio::test]
    async fn poll_is_fifo_and_ack_removes() {
        let (svc, _db, clock, user) = setup().await;
        let a = svc.enqueue(&user, "navigate", &json!({"url": "u"})).await.unwrap();
        clock.advance(1);
        let b = svc.enqueue(&user, "play", &json!({})).await.unwrap();

        let ids: Vec<i64> = svc.poll_pending(&user).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![a, b]);

        assert!(svc.acknowledge(a, &user).await.unwrap());
        let ids: Vec<i64> = svc.poll_pending(&user).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![b]);

        assert!(!svc.acknowledge(a, &user).await.unwrap());
    }

    #[tokio::test]
    async fn poll_is_limited() {
        let (svc, _db, _clock, user) = setup().await;
        for _ in 0..15 {
            svc.enqueue(&user, "play", &json!({})).await.unwrap();
        }
        assert_eq!(svc.poll_pending(&user).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn cross_tenant_ack_is_a_no_op() {
        let (svc, db, _clock, a) = setup().await;
        let b = db.get_or_create_user(2, "bob", T0).await.unwrap().id;
        let id = svc.enqueue(&a, "play", &json!({})).await.unwrap();

        assert!(!svc.acknowledge(id, &b).await.unwrap());
        assert_eq!(svc.poll_pending(&a).await.unwrap().len(), 1);

        assert!(svc.acknowledge(id, &a).await.unwrap());
        assert!(svc.poll_pending(&a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enqueue_requires_type() {
        let (svc, _db, _clock, user) = setup().await;
        assert!(matches!(
            svc.enqueue(&user, " ", &json!({})).await,
            Err(SyncError::Validation(_))
        ));
    }
}
