//! Authentication for `AniPilot` relay.
//!
//! Two independent paths:
//! - agents present a bearer credential issued at pairing time, validated
//!   by signature plus an exact match against the stored credential, with a
//!   short-lived cache in front;
//! - the control plane presents signed session parameters, checked
//!   statelessly on every request.

pub mod agent;
pub mod cache;
pub mod claims;
pub mod init_data;
pub mod jwt;
pub mod pairing;

pub use agent::AgentAuthenticator;
pub use cache::CredentialCache;
pub use claims::Claims;
pub use init_data::{InitDataValidator, SessionUser};
pub use jwt::JwtManager;
pub use pairing::{PairingCode, PairingService, RedeemedPairing};

use anipilot_core::db::DatabaseError;

/// Authentication failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No credential")]
    Missing,

    #[error("Bad credential")]
    Invalid,

    #[error("Revoked")]
    Revoked,

    #[error("Invalid session")]
    InvalidSession,

    #[error("No user in session")]
    MissingUser,

    #[error("Invalid or expired code")]
    CodeNotFound,

    #[error("Credential signing failed: {0}")]
    Signing(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DatabaseError> for AuthError {
    fn from(e: DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}
