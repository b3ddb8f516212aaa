//! User, credential, pairing-code and settings queries.

use super::db::RelayDatabase;
use super::models::{SettingsPatch, User};
use anipilot_core::db::DatabaseError;

impl RelayDatabase {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Get a user by external chat handle.
    pub async fn get_user_by_chat(&self, chat_id: i64) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    /// Return the user for `chat_id`, creating it and its empty sync state on
    /// first contact.
    ///
    /// Safe under concurrent first contacts: the insert is a no-op if another
    /// request won the race, and the row is re-read afterwards.
    pub async fn get_or_create_user(
        &self,
        chat_id: i64,
        username: &str,
        now: i64,
    ) -> Result<User, DatabaseError> {
        if let Some(user) = self.get_user_by_chat(chat_id).await? {
            return Ok(user);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO users (id, chat_id, username, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(chat_id) DO NOTHING",
        )
        .bind(&id)
        .bind(chat_id)
        .bind(username)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO sync_state (user_id, updated_at) \
             SELECT id, ? FROM users WHERE chat_id = ? \
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(now)
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_user_by_chat(chat_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User with chat {chat_id}")))
    }

    // =========================================================================
    // Pairing and credential queries
    // =========================================================================

    /// Store a pairing code for a user, replacing any previous one.
    pub async fn set_connect_code(
        &self,
        user_id: &str,
        code: &str,
        expires_at: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET connect_code = ?, code_expires = ? WHERE id = ?")
            .bind(code)
            .bind(expires_at)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Find the user holding an unexpired pairing code.
    pub async fn find_user_by_code(
        &self,
        code: &str,
        now: i64,
    ) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE connect_code = ? AND code_expires > ?",
        )
        .bind(code)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    /// Replace the user's credential and consume the pairing code.
    ///
    /// Only succeeds if `code` is still the user's code, so two concurrent
    /// redemptions of one code cannot both issue a credential.
    pub async fn redeem_code(
        &self,
        user_id: &str,
        code: &str,
        token: &str,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET token = ?, connect_code = NULL, code_expires = 0, updated_at = ? \
             WHERE id = ? AND connect_code = ?",
        )
        .bind(token)
        .bind(now)
        .bind(user_id)
        .bind(code)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop the user's credential if it is still `token`.
    pub async fn clear_token(
        &self,
        user_id: &str,
        token: &str,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("UPDATE users SET token = NULL, updated_at = ? WHERE id = ? AND token = ?")
                .bind(now)
                .bind(user_id)
                .bind(token)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Settings queries
    // =========================================================================

    /// Update only the opt-in flags present in the patch.
    pub async fn update_settings(
        &self,
        user_id: &str,
        patch: &SettingsPatch,
        now: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE users SET \
             notify_crash = COALESCE(?, notify_crash), \
             notify_marathon = COALESCE(?, notify_marathon), \
             notify_offline = COALESCE(?, notify_offline), \
             notify_digest = COALESCE(?, notify_digest), \
             updated_at = ? \
             WHERE id = ?",
        )
        .bind(patch.notify_crash)
        .bind(patch.notify_marathon)
        .bind(patch.notify_offline)
        .bind(patch.notify_digest)
        .bind(now)
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
