//! Agent credential issuance and signature validation.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};

use super::AuthError;
use super::claims::Claims;

/// Signs and verifies agent credentials.
///
/// Expiry is checked against the caller's clock rather than wall time, so
/// validation stays deterministic under a manual clock.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime_ms: i64,
}

impl JwtManager {
    /// Create a new `JwtManager` with the given secret.
    pub fn new(secret: &[u8], lifetime_ms: i64) -> Self {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        validation.set_required_spec_claims::<&str>(&[]);
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            lifetime_ms,
        }
    }

    /// Issue a credential for the given user.
    pub fn issue(&self, user_id: &str, chat_id: i64, now_ms: i64) -> Result<String, AuthError> {
        let claims = Claims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user_id.to_string(),
            chat: chat_id,
            iat: now_ms / 1000,
            exp: (now_ms + self.lifetime_ms) / 1000,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify the signature and expiry of a credential and return its claims.
    pub fn validate(&self, token: &str, now_ms: i64) -> Result<Claims, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::Invalid)?;
        if data.claims.is_expired(now_ms) {
            return Err(AuthError::Invalid);
        }
        Ok(data.claims)
    }
}
