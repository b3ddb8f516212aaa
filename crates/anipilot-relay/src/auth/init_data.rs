//! Stateless validation of control-plane sessions.
//!
//! The companion app forwards the signed launch parameters it received from
//! the chat platform. They are checked with an HMAC over the canonical
//! parameter string on every request and never cached, so rotating the bot
//! secret takes effect immediately.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Key used to derive the per-bot secret from the bot token.
const SECRET_DERIVATION_KEY: &[u8] = b"WebAppData";

/// The chat user a verified session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl SessionUser {
    /// `username`, else `first_name`, else empty.
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.first_name.as_deref())
            .unwrap_or("")
    }
}

/// Verifies signed session parameters against a shared bot secret.
#[derive(Clone)]
pub struct InitDataValidator {
    secret: [u8; 32],
}

impl InitDataValidator {
    pub fn new(bot_token: &str) -> Self {
        Self {
            secret: hmac_sha256(SECRET_DERIVATION_KEY, bot_token.as_bytes()),
        }
    }

    /// Check the signature and return the session's user.
    pub fn validate(&self, init_data: &str) -> Result<SessionUser, AuthError> {
        if init_data.is_empty() {
            return Err(AuthError::Missing);
        }

        let mut hash = None;
        let mut user = None;
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (key, value) in url::form_urlencoded::parse(init_data.as_bytes()) {
            match key.as_ref() {
                "hash" => hash = Some(value.into_owned()),
                "user" => {
                    user = Some(value.to_string());
                    pairs.push((key.into_owned(), value.into_owned()));
                }
                _ => pairs.push((key.into_owned(), value.into_owned())),
            }
        }

        let hash = hash.ok_or(AuthError::InvalidSession)?;
        let provided = hex::decode(hash).map_err(|_| AuthError::InvalidSession)?;
        let expected = hmac_sha256(&self.secret, check_string(pairs).as_bytes());
        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            return Err(AuthError::InvalidSession);
        }

        let user = user.ok_or(AuthError::MissingUser)?;
        serde_json::from_str(&user).map_err(|_| AuthError::MissingUser)
    }

    /// Sign `pairs` the way the chat platform does. Used to build sessions in tests.
    #[cfg(test)]
    pub(crate) fn sign(&self, pairs: &[(&str, &str)]) -> String {
        let owned = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let hash = hex::encode(hmac_sha256(&self.secret, check_string(owned).as_bytes()));
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k, v);
        }
        serializer.append_pair("hash", &hash);
        serializer.finish()
    }
}

/// `key=value` lines sorted by key, joined by newlines.
fn check_string(mut pairs: Vec<(String, String)>) -> String {
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}
