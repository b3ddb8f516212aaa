//! Notification cooldown ledger queries.
//!
//! The ledger is write-once and only ever consulted within the cooldown
//! window; rows past retention are purged by the liveness sweep.

use super::db::RelayDatabase;
use anipilot_core::db::DatabaseError;

impl RelayDatabase {
    /// Whether a notification of `kind` was sent to the user after `since`.
    pub async fn notified_since(
        &self,
        user_id: &str,
        kind: &str,
        since: i64,
    ) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM notification_log \
             WHERE user_id = ? AND type = ? AND sent_at > ? LIMIT 1",
        )
        .bind(user_id)
        .bind(kind)
        .bind(since)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.is_some())
    }

    /// Record a delivered notification.
    pub async fn log_notification(
        &self,
        user_id: &str,
        kind: &str,
        now: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO notification_log (user_id, type, sent_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(kind)
            .bind(now)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Remove ledger rows sent before `cutoff`.
    pub async fn purge_notifications_before(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM notification_log WHERE sent_at < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
