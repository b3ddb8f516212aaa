//! Bearer-credential authentication for agents.

use std::sync::Arc;

use anipilot_core::Clock;
use anipilot_core::db::DatabaseError;
use tracing::{debug, warn};

use super::{AuthError, CredentialCache, JwtManager};
use crate::storage::{RelayDatabase, User};

/// Resolves an agent's bearer credential to its user.
pub struct AgentAuthenticator {
    db: RelayDatabase,
    jwt: Arc<JwtManager>,
    cache: Arc<CredentialCache>,
    clock: Arc<dyn Clock>,
}

impl AgentAuthenticator {
    pub fn new(
        db: RelayDatabase,
        jwt: Arc<JwtManager>,
        cache: Arc<CredentialCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            jwt,
            cache,
            clock,
        }
    }

    /// Authenticate a credential.
    ///
    /// A cache hit short-circuits everything. On a miss the signature is
    /// verified, the user reloaded, and the stored credential must equal the
    /// presented one exactly: a well-signed credential that has since been
    /// rotated out is rejected as revoked.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        if let Some(user) = self.cache.get(token).await {
            return Ok(user);
        }

        let claims = self.jwt.validate(token, self.clock.now_ms())?;

        let user = match self.db.get_user(&claims.sub).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => {
                warn!(user_id = %claims.sub, "Credential for unknown user");
                return Err(AuthError::Revoked);
            }
            Err(e) => return Err(e.into()),
        };

        if user.token.as_deref() != Some(token) {
            debug!(user_id = %user.id, "Credential no longer current");
            return Err(AuthError::Revoked);
        }

        self.cache.insert(token.to_string(), user.clone()).await;
        Ok(user)
    }
}
