//! Opt-in and cooldown gated notification dispatch.

use std::sync::Arc;

use anipilot_core::Clock;
use anipilot_core::db::DatabaseError;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::templates::{self, RenderedMessage};
use super::{NotificationError, NotificationKind, NotificationSink};
use crate::storage::RelayDatabase;

/// What happened to one `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    UnknownUser,
    NoTemplate,
    OptedOut,
    CoolingDown,
    Failed,
}

pub struct NotificationDispatcher {
    db: RelayDatabase,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    cooldown_ms: i64,
}

impl NotificationDispatcher {
    pub fn new(
        db: RelayDatabase,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        cooldown_ms: i64,
    ) -> Self {
        Self {
            db,
            sink,
            clock,
            cooldown_ms,
        }
    }

    /// Send a notification of type `kind` to a user, best-effort.
    ///
    /// Never fails: storage and delivery errors are logged and reported as
    /// [`Delivery::Failed`]. The ledger entry is written only after the sink
    /// accepted the message.
    #[instrument(skip(self, payload))]
    pub async fn send(&self, user_id: &str, kind: &str, payload: &Value) -> Delivery {
        match self.try_send(user_id, kind, payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(user_id = %user_id, kind = %kind, error = %e, "Notification failed");
                Delivery::Failed
            }
        }
    }

    async fn try_send(
        &self,
        user_id: &str,
        kind: &str,
        payload: &Value,
    ) -> Result<Delivery, NotificationError> {
        let user = match self.db.get_user(user_id).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => return Ok(Delivery::UnknownUser),
            Err(e) => return Err(e.into()),
        };

        let Some(kind) = NotificationKind::parse(kind) else {
            debug!(kind = %kind, "No template for notification type");
            return Ok(Delivery::NoTemplate);
        };

        if !kind.enabled_for(&user) {
            debug!(user_id = %user_id, kind = %kind, "Notification opted out");
            return Ok(Delivery::OptedOut);
        }

        let now = self.clock.now_ms();
        if self
            .db
            .notified_since(user_id, kind.as_str(), now - self.cooldown_ms)
            .await?
        {
            debug!(user_id = %user_id, kind = %kind, "Notification suppressed by cooldown");
            return Ok(Delivery::CoolingDown);
        }

        let message = templates::render(kind, payload, user_id);
        self.sink.deliver(user.chat_id, &message).await?;
        self.db.log_notification(user_id, kind.as_str(), now).await?;

        info!(user_id = %user_id, kind = %kind, "Notification sent");
        Ok(Delivery::Sent)
    }

    /// Fire [`send`](Self::send) on a background task.
    pub fn spawn_send(
        self: &Arc<Self>,
        user_id: String,
        kind: String,
        payload: Value,
    ) -> JoinHandle<Delivery> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.send(&user_id, &kind, &payload).await })
    }

    /// Deliver a fixed message to a chat with no opt-in or cooldown checks,
    /// on a background task. Failures are logged.
    pub fn spawn_direct(
        self: &Arc<Self>,
        chat_id: i64,
        message: RenderedMessage,
    ) -> JoinHandle<bool> {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            match sink.deliver(chat_id, &message).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(chat_id, error = %e, "Direct chat message failed");
                    false
                }
            }
        })
    }
}
