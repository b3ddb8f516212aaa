//! Command queue queries.

use serde_json::Value;
use sqlx::types::Json;

use super::db::RelayDatabase;
use super::models::Command;
use anipilot_core::db::DatabaseError;

impl RelayDatabase {
    /// Append a command to a user's queue. Returns the new command ID.
    pub async fn insert_command(
        &self,
        user_id: &str,
        command_type: &str,
        payload: &Value,
        now: i64,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO commands (user_id, type, payload, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(command_type)
        .bind(Json(payload))
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Oldest-first commands still queued for one user.
    ///
    /// Commands are NOT removed by this call; the agent acknowledges each one
    /// with `delete_command` after executing it.
    pub async fn pending_commands(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Command>, DatabaseError> {
        let commands = sqlx::query_as::<_, Command>(
            "SELECT * FROM commands WHERE user_id = ? ORDER BY created_at ASC, id ASC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(commands)
    }

    /// Delete a command, but only if it belongs to `user_id`.
    pub async fn delete_command(&self, id: i64, user_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM commands WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove every command created before `cutoff`, acknowledged or not.
    pub async fn purge_commands_before(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM commands WHERE created_at < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }

    /// Count queued commands for a user.
    #[cfg(test)]
    pub(crate) async fn count_commands(&self, user_id: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commands WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }
}
