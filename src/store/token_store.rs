//! Two-tier token lookup: live sources in the cache first, then the refresh
//! token history in persistence, newest first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::cache::{CachedEntry, MemoryTokenCache, TokenCache};
use super::persistent::RefreshTokenPersistence;
use crate::error::{ExchangeError, TokenError};
use crate::exchange::TokenExchanger;
use crate::identity::Identity;
use crate::lock::LockExt;
use crate::source::{RefreshingTokenSource, TokenSource};
use crate::token::Token;

/// Attempts used by [`TokenStore::get_token`] unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: usize = 2;

/// One async lock per identity. Serializes the read-decide-write sequence of
/// a lookup so a rotation is recorded once, while different identities never
/// wait on each other.
///
/// An entry lives only while some call holds or waits on it, so the map is
/// bounded by the number of identities with a call in flight.
#[derive(Default)]
struct IdentityLocks {
    locks: Mutex<HashMap<Identity, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
    async fn lock(&self, identity: &Identity) -> IdentityGuard<'_> {
        let lock = self
            .locks
            .locked()
            .entry(identity.clone())
            .or_default()
            .clone();
        // Built before waiting so a cancelled wait still prunes the entry.
        let mut held = IdentityGuard {
            locks: self,
            identity: identity.clone(),
            guard: None,
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.locked().len()
    }
}

struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    identity: Identity,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        // The owned guard holds a reference to the lock; release it first.
        self.guard.take();

        // Waiters clone the Arc under the map lock, so a count of one means
        // only the map still refers to it.
        let mut locks = self.locks.locks.locked();
        if locks
            .get(&self.identity)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.identity);
        }
    }
}

pub struct TokenStore {
    cache: Arc<dyn TokenCache>,
    persistent: Arc<dyn RefreshTokenPersistence>,
    exchanger: Arc<dyn TokenExchanger>,
    locks: IdentityLocks,
    max_attempts: usize,
}

impl TokenStore {
    pub fn new(
        exchanger: Arc<dyn TokenExchanger>,
        persistent: Arc<dyn RefreshTokenPersistence>,
    ) -> Self {
        Self {
            cache: Arc::new(MemoryTokenCache::new()),
            persistent,
            exchanger,
            locks: IdentityLocks::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// [`get_token_with_retry`](Self::get_token_with_retry) with the configured attempts.
    pub async fn get_token(&self, identity: &Identity) -> Result<Token, TokenError> {
        self.get_token_with_retry(identity, self.max_attempts).await
    }

    /// Get a valid token for `identity`.
    ///
    /// Tries the cached token source first. If there is none, or it fails,
    /// walks the refresh token history from the newest row, exchanging at most
    /// `max_attempts` stored refresh tokens. A stored token the server rejects
    /// is flagged invalid and the walk continues with the next older one.
    ///
    /// Any refresh token that comes back different from the one presented is
    /// appended to the history before the token is returned.
    pub async fn get_token_with_retry(
        &self,
        identity: &Identity,
        max_attempts: usize,
    ) -> Result<Token, TokenError> {
        let _guard = self.locks.lock(identity).await;

        if let Some(token) = self.token_from_cache(identity).await? {
            return Ok(token);
        }

        // Invalidating a row shifts the older ones up, so the index only
        // advances past rows that stay valid.
        let mut index = 0;
        for attempt in 0..max_attempts {
            let Some(refresh_token) = self.persistent.find_refresh_token(identity, index).await?
            else {
                debug!(identity = %identity, index, "Refresh token history exhausted");
                break;
            };

            let source = Arc::new(RefreshingTokenSource::seeded(
                self.exchanger.clone(),
                &refresh_token,
            ));

            match source.token().await {
                Ok(token) => {
                    let current = self.record_rotation(identity, &refresh_token, &token).await?;
                    self.cache.set(
                        identity,
                        CachedEntry {
                            source,
                            refresh_token: current,
                        },
                    );
                    info!(identity = %identity, attempt, "Token restored from persistent store");
                    return Ok(token);
                }
                Err(ExchangeError::Rejected(reason)) => {
                    warn!(identity = %identity, index, "Stored refresh token rejected: {reason}");
                    if let Err(e) = self
                        .persistent
                        .invalidate_refresh_token(identity, &refresh_token)
                        .await
                    {
                        error!(identity = %identity, "Failed to invalidate refresh token: {e}");
                        index += 1;
                    }
                }
                Err(ExchangeError::Unavailable(reason)) => {
                    warn!(identity = %identity, index, "Refresh exchange failed: {reason}");
                    index += 1;
                }
            }
        }

        Err(TokenError::TokenNotFound(identity.clone()))
    }

    /// Record a refresh token obtained out of band (e.g. right after the user
    /// granted access) as the newest credential for `identity`.
    pub async fn save_refresh_token(
        &self,
        identity: &Identity,
        refresh_token: &str,
    ) -> Result<(), TokenError> {
        let _guard = self.locks.lock(identity).await;

        let newest = self.persistent.find_refresh_token(identity, 0).await?;
        if newest.as_deref() != Some(refresh_token) {
            self.persistent
                .insert_refresh_token(identity, refresh_token)
                .await?;
        }
        self.cache.unset(identity);
        info!(identity = %identity, "Refresh token saved");
        Ok(())
    }

    /// Flag each of `refresh_tokens` invalid. Stops at the first failure.
    pub async fn invalidate_refresh_tokens(
        &self,
        identity: &Identity,
        refresh_tokens: &[String],
    ) -> Result<(), TokenError> {
        let _guard = self.locks.lock(identity).await;

        for refresh_token in refresh_tokens {
            self.persistent
                .invalidate_refresh_token(identity, refresh_token)
                .await?;
        }
        if let Some(entry) = self.cache.get(identity) {
            if refresh_tokens.contains(&entry.refresh_token) {
                self.cache.unset(identity);
            }
        }
        Ok(())
    }

    /// Drop the cached source for `identity`; the next lookup goes to persistence.
    pub fn forget(&self, identity: &Identity) {
        self.cache.unset(identity);
    }

    async fn token_from_cache(&self, identity: &Identity) -> Result<Option<Token>, TokenError> {
        let Some(entry) = self.cache.get(identity) else {
            return Ok(None);
        };

        match entry.source.token().await {
            Ok(token) => {
                let current = self
                    .record_rotation(identity, &entry.refresh_token, &token)
                    .await?;
                if current != entry.refresh_token {
                    self.cache.set(
                        identity,
                        CachedEntry {
                            source: entry.source,
                            refresh_token: current,
                        },
                    );
                }
                debug!(identity = %identity, "Token from cache");
                Ok(Some(token))
            }
            Err(e) => {
                warn!(identity = %identity, "Cached token source failed: {e}");
                self.cache.unset(identity);
                Ok(None)
            }
        }
    }

    /// Append the token's refresh token to the history if it differs from
    /// `known`. Returns the refresh token now in force.
    async fn record_rotation(
        &self,
        identity: &Identity,
        known: &str,
        token: &Token,
    ) -> Result<String, TokenError> {
        match token.refresh_token.as_deref() {
            Some(rotated) if rotated != known => {
                self.persistent
                    .insert_refresh_token(identity, rotated)
                    .await?;
                info!(identity = %identity, "Refresh token rotated");
                Ok(rotated.to_string())
            }
            _ => Ok(known.to_string()),
        }
    }
}
