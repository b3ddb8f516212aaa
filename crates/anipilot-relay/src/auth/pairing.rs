//! Pairing codes: binding an agent to a user account.
//!
//! The control plane asks for a short code, the user types it into the
//! agent, and the agent trades it for a durable credential. A code is
//! consumed exactly once.

use std::sync::Arc;

use anipilot_core::Clock;
use rand::Rng;
use serde::Serialize;
use tracing::{info, instrument};

use super::{AuthError, CredentialCache, JwtManager};
use crate::storage::{RelayDatabase, User};

/// Unambiguous alphabet (no `0/O`, `1/I`).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

/// A freshly issued pairing code.
#[derive(Debug, Clone, Serialize)]
pub struct PairingCode {
    pub code: String,
    pub expires_at: i64,
}

/// Outcome of a successful redemption.
#[derive(Debug, Clone)]
pub struct RedeemedPairing {
    pub token: String,
    pub user: User,
}

/// Generate a code of the form `ABC-DEF`.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let chars: String = (0..CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect();
    format!("{}-{}", &chars[..CODE_LEN / 2], &chars[CODE_LEN / 2..])
}

/// Canonical form of user-typed input: upper case, no whitespace.
pub fn normalize_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

pub struct PairingService {
    db: RelayDatabase,
    jwt: Arc<JwtManager>,
    cache: Arc<CredentialCache>,
    clock: Arc<dyn Clock>,
    code_ttl_ms: i64,
}

impl PairingService {
    pub fn new(
        db: RelayDatabase,
        jwt: Arc<JwtManager>,
        cache: Arc<CredentialCache>,
        clock: Arc<dyn Clock>,
        code_ttl_ms: i64,
    ) -> Self {
        Self {
            db,
            jwt,
            cache,
            clock,
            code_ttl_ms,
        }
    }

    /// Issue a new code for the user, replacing any unredeemed one.
    #[instrument(skip(self))]
    pub async fn issue_code(&self, user_id: &str) -> Result<PairingCode, AuthError> {
        let code = generate_code(&mut rand::thread_rng());
        let expires_at = self.clock.now_ms() + self.code_ttl_ms;
        self.db.set_connect_code(user_id, &code, expires_at).await?;

        info!(user_id = %user_id, expires_at, "Pairing code issued");
        Ok(PairingCode { code, expires_at })
    }

    /// Trade a code for a credential.
    ///
    /// The new credential replaces the stored one, which invalidates every
    /// credential issued before it once its cache entry expires.
    #[instrument(skip(self, input))]
    pub async fn redeem(&self, input: &str) -> Result<RedeemedPairing, AuthError> {
        let code = normalize_code(input);
        let now = self.clock.now_ms();

        let user = self
            .db
            .find_user_by_code(&code, now)
            .await?
            .ok_or(AuthError::CodeNotFound)?;

        let token = self.jwt.issue(&user.id, user.chat_id, now)?;
        if !self.db.redeem_code(&user.id, &code, &token, now).await? {
            return Err(AuthError::CodeNotFound);
        }

        info!(user_id = %user.id, "Agent paired");
        Ok(RedeemedPairing { token, user })
    }

    /// Revoke the credential immediately (explicit agent logout).
    #[instrument(skip(self, token))]
    pub async fn revoke(&self, user_id: &str, token: &str) -> Result<(), AuthError> {
        self.cache.invalidate(token).await;
        if self.db.clear_token(user_id, token, self.clock.now_ms()).await? {
            info!(user_id = %user_id, "Agent credential revoked");
        }
        Ok(())
    }
}
