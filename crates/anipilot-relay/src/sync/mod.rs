//! Heartbeat-driven sync state and the polled command channel.
//!
//! The agent has no persistent connection. It pushes its state with periodic
//! heartbeats and pulls pending commands, acknowledging each one after it
//! runs. Acknowledgment deletes the command, so delivery is at-most-once.
//!
//! One consumer per user is assumed: two agents polling the same queue may
//! both execute a command before either acknowledges it.

pub mod service;

pub use service::SyncService;

use anipilot_core::db::DatabaseError;

/// Errors from sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The request was malformed; nothing was written.
    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DatabaseError> for SyncError {
    fn from(e: DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}
