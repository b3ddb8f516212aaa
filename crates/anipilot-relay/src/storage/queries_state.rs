//! Sync state queries: partial upserts and the stale-agent scan.

use sqlx::{QueryBuilder, Sqlite};

use super::db::RelayDatabase;
use super::models::{StatePatch, SyncState, SyncStateRow};
use anipilot_core::db::DatabaseError;

/// A single column value to bind in a patch statement.
enum ColumnValue {
    Int(i64),
    Real(f64),
    Text(String),
}

impl ColumnValue {
    fn push_bind(self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Self::Int(v) => qb.push_bind(v),
            Self::Real(v) => qb.push_bind(v),
            Self::Text(v) => qb.push_bind(v),
        };
    }
}

/// Columns a patch sets, in a fixed order.
fn patch_columns(patch: &StatePatch) -> Result<Vec<(&'static str, ColumnValue)>, DatabaseError> {
    let mut cols = Vec::new();
    let flag = |b: bool| ColumnValue::Int(i64::from(b));

    if let Some(v) = patch.online {
        cols.push(("is_online", flag(v)));
    }
    if let Some(v) = patch.last_heartbeat {
        cols.push(("last_heartbeat", ColumnValue::Int(v)));
    }
    if let Some(v) = patch.notified_offline {
        cols.push(("notified_offline", flag(v)));
    }
    if let Some(v) = &patch.url {
        cols.push(("current_url", ColumnValue::Text(v.clone())));
    }
    if let Some(v) = &patch.anime {
        cols.push(("current_anime", ColumnValue::Text(serde_json::to_string(v)?)));
    }
    if let Some(v) = patch.season {
        cols.push(("current_season", ColumnValue::Int(v)));
    }
    if let Some(v) = patch.episode {
        cols.push(("current_episode", ColumnValue::Int(v)));
    }
    if let Some(v) = patch.video_time {
        cols.push(("video_time", ColumnValue::Real(v)));
    }
    if let Some(v) = patch.video_duration {
        cols.push(("video_duration", ColumnValue::Real(v)));
    }
    if let Some(v) = patch.playing {
        cols.push(("is_playing", flag(v)));
    }
    if let Some(v) = patch.marathon_on {
        cols.push(("marathon_on", flag(v)));
    }
    if let Some(v) = patch.marathon_idx {
        cols.push(("marathon_idx", ColumnValue::Int(v)));
    }
    if let Some(v) = &patch.marathon_queue {
        cols.push(("marathon_queue", ColumnValue::Text(serde_json::to_string(v)?)));
    }
    if let Some(v) = &patch.history {
        cols.push(("history", ColumnValue::Text(serde_json::to_string(v)?)));
    }
    if let Some(v) = patch.binge {
        cols.push(("binge_today", ColumnValue::Int(v)));
    }
    if let Some(v) = &patch.binge_date {
        cols.push(("binge_date", ColumnValue::Text(v.clone())));
    }
    if let Some(v) = patch.watch_minutes {
        cols.push(("watch_minutes", ColumnValue::Int(v)));
    }
    Ok(cols)
}

impl RelayDatabase {
    /// Get the sync state for a user, if the row exists.
    pub async fn get_state(&self, user_id: &str) -> Result<Option<SyncState>, DatabaseError> {
        let row = sqlx::query_as::<_, SyncStateRow>("SELECT * FROM sync_state WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(SyncState::from))
    }

    /// Merge a patch into the user's sync state in one statement.
    ///
    /// Only the columns present in the patch are written; the row is created
    /// with defaults if missing.
    pub async fn upsert_state(
        &self,
        user_id: &str,
        patch: &StatePatch,
        now: i64,
    ) -> Result<(), DatabaseError> {
        let cols = patch_columns(patch)?;
        let names: Vec<&'static str> = cols.iter().map(|(name, _)| *name).collect();

        let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO sync_state (user_id, updated_at");
        for name in &names {
            qb.push(", ").push(*name);
        }
        qb.push(") VALUES (");
        qb.push_bind(user_id.to_string());
        qb.push(", ");
        qb.push_bind(now);
        for (_, value) in cols {
            qb.push(", ");
            value.push_bind(&mut qb);
        }
        qb.push(") ON CONFLICT(user_id) DO UPDATE SET updated_at = excluded.updated_at");
        for name in &names {
            qb.push(", ").push(*name).push(" = excluded.").push(*name);
        }

        qb.build().execute(self.pool()).await?;
        Ok(())
    }

    /// States flagged online and not yet notified whose last heartbeat is
    /// strictly older than `stale_before`.
    pub async fn get_stale_online(
        &self,
        stale_before: i64,
    ) -> Result<Vec<SyncState>, DatabaseError> {
        let rows = sqlx::query_as::<_, SyncStateRow>(
            "SELECT * FROM sync_state \
             WHERE is_online = 1 AND notified_offline = 0 AND last_heartbeat < ? \
             ORDER BY last_heartbeat ASC",
        )
        .bind(stale_before)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(SyncState::from).collect())
    }

    /// Flip a stale agent to offline and suppress further offline alerts.
    ///
    /// Re-checks the stale scan's predicate, so a heartbeat that landed after
    /// the scan is not overwritten and a row is flipped at most once.
    /// Returns whether the row was updated.
    pub async fn mark_offline_notified(
        &self,
        user_id: &str,
        stale_before: i64,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE sync_state SET is_online = 0, notified_offline = 1, updated_at = ? \
             WHERE user_id = ? AND is_online = 1 AND notified_offline = 0 \
             AND last_heartbeat < ?",
        )
        .bind(now)
        .bind(user_id)
        .bind(stale_before)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
