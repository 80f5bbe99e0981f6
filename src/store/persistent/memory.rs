use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{fingerprint, open, seal, PersistedRefreshToken, RefreshTokenPersistence};
use crate::crypto::CryptoService;
use crate::error::TokenError;
use crate::identity::Identity;
use crate::lock::LockExt;

/// In-process refresh token history with the same semantics as the
/// PostgreSQL store. Lost on restart.
#[derive(Default)]
pub struct MemoryRefreshTokenStore {
    // Per identity, oldest first.
    rows: Mutex<HashMap<Identity, Vec<PersistedRefreshToken>>>,
    crypto: Option<Arc<dyn CryptoService>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crypto(crypto: Arc<dyn CryptoService>) -> Self {
        Self {
            rows: Mutex::default(),
            crypto: Some(crypto),
        }
    }

    /// Full history for `identity`, newest first, invalid rows included.
    pub fn rows(&self, identity: &Identity) -> Vec<PersistedRefreshToken> {
        self.rows
            .locked()
            .get(identity)
            .map(|rows| rows.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RefreshTokenPersistence for MemoryRefreshTokenStore {
    async fn find_refresh_token(
        &self,
        identity: &Identity,
        index: usize,
    ) -> Result<Option<String>, TokenError> {
        let stored = {
            let rows = self.rows.locked();
            rows.get(identity).and_then(|rows| {
                rows.iter()
                    .rev()
                    .filter(|row| row.valid)
                    .nth(index)
                    .map(|row| row.refresh_token.clone())
            })
        };

        stored.map(|value| open(self.crypto.as_ref(), value)).transpose()
    }

    async fn insert_refresh_token(
        &self,
        identity: &Identity,
        refresh_token: &str,
    ) -> Result<(), TokenError> {
        let row = PersistedRefreshToken {
            refresh_token: seal(self.crypto.as_ref(), refresh_token)?,
            token_hash: fingerprint(refresh_token),
            valid: true,
            created_at: Utc::now(),
        };
        self.rows
            .locked()
            .entry(identity.clone())
            .or_default()
            .push(row);
        Ok(())
    }

    async fn invalidate_refresh_token(
        &self,
        identity: &Identity,
        refresh_token: &str,
    ) -> Result<(), TokenError> {
        let hash = fingerprint(refresh_token);
        if let Some(rows) = self.rows.locked().get_mut(identity) {
            rows.iter_mut()
                .filter(|row| row.token_hash == hash)
                .for_each(|row| row.valid = false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcmCrypto;
    use base64::Engine as _;

    #[tokio::test]
    async fn test_find_is_newest_first() {
        let store = MemoryRefreshTokenStore::new();
        let id = Identity::new("196");
        store.insert_refresh_token(&id, "r0").await.unwrap();
        store.insert_refresh_token(&id, "r1").await.unwrap();

        assert_eq!(store.find_refresh_token(&id, 0).await.unwrap().as_deref(), Some("r1"));
        assert_eq!(store.find_refresh_token(&id, 1).await.unwrap().as_deref(), Some("r0"));
        assert_eq!(store.find_refresh_token(&id, 2).await.unwrap(), None);
        assert_eq!(
            store.find_refresh_token(&Identity::new("other"), 0).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_invalidate_skips_row_but_keeps_it() {
        let store = MemoryRefreshTokenStore::new();
        let id = Identity::new("196");
        store.insert_refresh_token(&id, "r0").await.unwrap();
        store.insert_refresh_token(&id, "r1").await.unwrap();

        store.invalidate_refresh_token(&id, "r1").await.unwrap();

        assert_eq!(store.find_refresh_token(&id, 0).await.unwrap().as_deref(), Some("r0"));
        assert_eq!(store.find_refresh_token(&id, 1).await.unwrap(), None);

        let rows = store.rows(&id);
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].valid);
        assert!(rows[1].valid);
    }

    #[tokio::test]
    async fn test_encrypted_at_rest() {
        let key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        let crypto = Arc::new(AesGcmCrypto::new(&key).unwrap());
        let store = MemoryRefreshTokenStore::with_crypto(crypto);
        let id = Identity::new("196");

        store.insert_refresh_token(&id, "r0").await.unwrap();
        assert_ne!(store.rows(&id)[0].refresh_token, "r0");
        assert_eq!(store.find_refresh_token(&id, 0).await.unwrap().as_deref(), Some("r0"));

        // Matched by fingerprint even though ciphertexts differ per write.
        store.invalidate_refresh_token(&id, "r0").await.unwrap();
        assert_eq!(store.find_refresh_token(&id, 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_decrypt_failure_surfaces() {
        let key_a = base64::engine::general_purpose::STANDARD.encode([1u8; 32]);
        let key_b = base64::engine::general_purpose::STANDARD.encode([2u8; 32]);
        let id = Identity::new("196");

        let writer = MemoryRefreshTokenStore::with_crypto(Arc::new(AesGcmCrypto::new(&key_a).unwrap()));
        writer.insert_refresh_token(&id, "r0").await.unwrap();

        let reader = MemoryRefreshTokenStore {
            rows: Mutex::new(writer.rows.locked().clone()),
            crypto: Some(Arc::new(AesGcmCrypto::new(&key_b).unwrap())),
        };
        let err = reader.find_refresh_token(&id, 0).await.unwrap_err();
        assert!(matches!(err, TokenError::Crypto(_)));
    }
}
