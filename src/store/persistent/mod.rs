//! Durable history of refresh tokens per identity.
//!
//! Rows are appended on rotation and only ever flagged invalid, never deleted
//! or rewritten, so the table doubles as an audit trail.

mod memory;
mod postgres;

pub use memory::MemoryRefreshTokenStore;
pub use postgres::PgRefreshTokenStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::crypto::CryptoService;
use crate::error::TokenError;
use crate::identity::Identity;

#[async_trait]
pub trait RefreshTokenPersistence: Send + Sync {
    /// The `index`-th newest valid refresh token (0-based), `None` when the
    /// history has fewer valid rows.
    async fn find_refresh_token(
        &self,
        identity: &Identity,
        index: usize,
    ) -> Result<Option<String>, TokenError>;

    /// Append a new valid row.
    async fn insert_refresh_token(
        &self,
        identity: &Identity,
        refresh_token: &str,
    ) -> Result<(), TokenError>;

    /// Flag every row holding `refresh_token` as invalid.
    async fn invalidate_refresh_token(
        &self,
        identity: &Identity,
        refresh_token: &str,
    ) -> Result<(), TokenError>;
}

/// One row of an identity's history, as stored.
#[derive(Debug, Clone, Serialize)]
pub struct PersistedRefreshToken {
    /// Ciphertext when a crypto service is configured.
    pub refresh_token: String,
    pub token_hash: String,
    pub valid: bool,
    pub created_at: DateTime<Utc>,
}

/// Lookup key for a refresh token. Ciphertexts are randomized, so rows are
/// matched on this instead of the stored value.
pub fn fingerprint(refresh_token: &str) -> String {
    hex::encode(Sha256::digest(refresh_token.as_bytes()))
}

fn seal(crypto: Option<&Arc<dyn CryptoService>>, value: &str) -> Result<String, TokenError> {
    match crypto {
        Some(cs) => cs.encrypt(value),
        None => Ok(value.to_string()),
    }
}

fn open(crypto: Option<&Arc<dyn CryptoService>>, value: String) -> Result<String, TokenError> {
    match crypto {
        Some(cs) => cs.decrypt(&value),
        None => Ok(value),
    }
}
