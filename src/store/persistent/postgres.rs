//! PostgreSQL-backed refresh token history.
//!
//! Table `oauth_refresh_tokens`: one row per refresh token ever issued to an
//! identity, newest wins. The pool is owned by the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;

use super::{fingerprint, open, seal, PersistedRefreshToken, RefreshTokenPersistence};
use crate::crypto::CryptoService;
use crate::error::TokenError;
use crate::identity::Identity;

pub struct PgRefreshTokenStore {
    pool: PgPool,
    crypto: Option<Arc<dyn CryptoService>>,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool, crypto: Option<Arc<dyn CryptoService>>) -> Self {
        Self { pool, crypto }
    }

    /// Open a pool for `db_url` and wrap it.
    pub async fn connect(
        db_url: &str,
        crypto: Option<Arc<dyn CryptoService>>,
    ) -> Result<Self, TokenError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await
            .map_err(|e| TokenError::Persistence(format!("Failed to connect to PostgreSQL: {e}")))?;

        Ok(Self::new(pool, crypto))
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> Result<(), TokenError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_refresh_tokens (
                id              BIGSERIAL PRIMARY KEY,
                identity        TEXT NOT NULL,
                refresh_token   TEXT NOT NULL,
                token_hash      TEXT NOT NULL,
                valid           BOOLEAN NOT NULL DEFAULT TRUE,
                created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth_refresh_tokens_lookup ON oauth_refresh_tokens(identity, created_at DESC) WHERE valid"
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth_refresh_tokens_hash ON oauth_refresh_tokens(identity, token_hash)"
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Full history for an identity, newest first, invalid rows included.
    /// Values are returned as stored.
    pub async fn history(
        &self,
        identity: &Identity,
    ) -> Result<Vec<PersistedRefreshToken>, TokenError> {
        let rows = sqlx::query(
            r#"
            SELECT refresh_token, token_hash, valid, created_at
            FROM oauth_refresh_tokens
            WHERE identity = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(identity.as_str())
        .fetch_all(&self.pool)
        .await?;

        let history = rows
            .iter()
            .map(|row| PersistedRefreshToken {
                refresh_token: row.get(0),
                token_hash: row.get(1),
                valid: row.get(2),
                created_at: row.get::<DateTime<Utc>, _>(3),
            })
            .collect();

        Ok(history)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RefreshTokenPersistence for PgRefreshTokenStore {
    async fn find_refresh_token(
        &self,
        identity: &Identity,
        index: usize,
    ) -> Result<Option<String>, TokenError> {
        let offset = i64::try_from(index)
            .map_err(|_| TokenError::Persistence(format!("history index {index} out of range")))?;

        let row = sqlx::query(
            r#"
            SELECT refresh_token
            FROM oauth_refresh_tokens
            WHERE identity = $1 AND valid
            ORDER BY created_at DESC, id DESC
            LIMIT 1 OFFSET $2
            "#,
        )
        .bind(identity.as_str())
        .bind(offset)
        .fetch_optional(&self.pool)
        .await?;

        let stored: Option<String> = row.map(|r| r.get(0));
        stored.map(|value| open(self.crypto.as_ref(), value)).transpose()
    }

    async fn insert_refresh_token(
        &self,
        identity: &Identity,
        refresh_token: &str,
    ) -> Result<(), TokenError> {
        let stored = seal(self.crypto.as_ref(), refresh_token)?;

        sqlx::query(
            r#"
            INSERT INTO oauth_refresh_tokens (identity, refresh_token, token_hash, valid)
            VALUES ($1, $2, $3, TRUE)
            "#,
        )
        .bind(identity.as_str())
        .bind(&stored)
        .bind(fingerprint(refresh_token))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn invalidate_refresh_token(
        &self,
        identity: &Identity,
        refresh_token: &str,
    ) -> Result<(), TokenError> {
        sqlx::query(
            "UPDATE oauth_refresh_tokens SET valid = FALSE WHERE identity = $1 AND token_hash = $2 AND valid",
        )
        .bind(identity.as_str())
        .bind(fingerprint(refresh_token))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
