//! JWT claims structure for agent credentials.

use serde::{Deserialize, Serialize};

/// Claims embedded in an agent credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// JWT ID (unique per issued credential).
    pub jti: String,
    /// Subject (user ID).
    pub sub: String,
    /// External chat handle of the user.
    pub chat: i64,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiration (unix seconds).
    pub exp: i64,
}

impl Claims {
    /// Whether the credential is past its expiry at `now_ms`.
    pub const fn is_expired(&self, now_ms: i64) -> bool {
        self.exp.saturating_mul(1000) <= now_ms
    }
}
