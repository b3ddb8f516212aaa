//! Short-lived cache of validated agent credentials.
//!
//! Agents poll every few seconds; without the cache every poll would cost a
//! signature check plus a user lookup. Entries live for a fixed TTL, so a
//! rotated or revoked credential stops working within one TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anipilot_core::Clock;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::storage::User;

struct CacheEntry {
    user: User,
    cached_at: i64,
}

/// Maps a bearer credential to the user it resolved to.
///
/// Every operation is idempotent, so concurrent handlers may race freely:
/// the worst case is a redundant re-validation.
pub struct CredentialCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
}

impl CredentialCache {
    pub fn new(clock: Arc<dyn Clock>, ttl_ms: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            ttl_ms,
        }
    }

    /// The cached user for `token`, if cached within the TTL.
    pub async fn get(&self, token: &str) -> Option<User> {
        let now = self.clock.now_ms();
        self.entries
            .read()
            .await
            .get(token)
            .filter(|entry| now - entry.cached_at < self.ttl_ms)
            .map(|entry| entry.user.clone())
    }

    pub async fn insert(&self, token: String, user: User) {
        let cached_at = self.clock.now_ms();
        self.entries
            .write()
            .await
            .insert(token, CacheEntry { user, cached_at });
    }

    /// Drop one credential immediately (explicit logout).
    pub async fn invalidate(&self, token: &str) {
        self.entries.write().await.remove(token);
    }

    /// Remove expired entries. Returns the count removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now - entry.cached_at < self.ttl_ms);
        before - entries.len()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Spawn a background task that sweeps the cache every `every`.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // Skip first immediate tick
            loop {
                interval.tick().await;
                let removed = cache.sweep().await;
                if removed > 0 {
                    debug!(removed, "Credential cache swept");
                }
            }
        })
    }
}
