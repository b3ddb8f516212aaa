//! Outbound chat notifications.
//!
//! - [`templates`] renders a notification type and payload into message text
//!   plus optional action buttons
//! - [`NotificationSink`] is the delivery seam, [`TelegramSink`] the real one
//! - [`NotificationDispatcher`] applies opt-ins and the cooldown ledger
//!
//! Notifications are best-effort: failures are logged and never reach the
//! operation that triggered them.

pub mod dispatcher;
pub mod sink;
pub mod templates;

pub use dispatcher::{Delivery, NotificationDispatcher};
pub use sink::{NotificationSink, TelegramSink};
pub use templates::{Action, RenderedMessage};

use crate::storage::User;

/// Errors that can occur in the notification subsystem.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// HTTP request to the chat API failed.
    #[error("Chat API request error: {0}")]
    Request(String),

    /// The chat API returned a non-success status code.
    #[error("Chat API error (status {status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anipilot_core::db::DatabaseError> for NotificationError {
    fn from(e: anipilot_core::db::DatabaseError) -> Self {
        Self::Database(e.to_string())
    }
}

/// Notification types that have a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    VideoCrash,
    ConnectionLost,
    MarathonCrash,
    MarathonComplete,
    ScriptOffline,
}

impl NotificationKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video_crash" => Some(Self::VideoCrash),
            "connection_lost" => Some(Self::ConnectionLost),
            "marathon_crash" => Some(Self::MarathonCrash),
            "marathon_complete" => Some(Self::MarathonComplete),
            "script_offline" => Some(Self::ScriptOffline),
            _ => None,
        }
    }

    /// Tag stored in the cooldown ledger.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VideoCrash => "video_crash",
            Self::ConnectionLost => "connection_lost",
            Self::MarathonCrash => "marathon_crash",
            Self::MarathonComplete => "marathon_complete",
            Self::ScriptOffline => "script_offline",
        }
    }

    /// Whether the user opted in to this kind's category.
    pub const fn enabled_for(self, user: &User) -> bool {
        match self {
            Self::VideoCrash | Self::ConnectionLost => user.notify_crash,
            Self::MarathonCrash | Self::MarathonComplete => user.notify_marathon,
            Self::ScriptOffline => user.notify_offline,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
