use anyhow::{Context, Result};
use std::time::Duration;

use crate::store::DEFAULT_MAX_ATTEMPTS;

/// Configuration for the binary, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Database ────────────────────────────────────────────────────────
    pub database_url: String,

    // ── Token endpoint ──────────────────────────────────────────────────
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Send client credentials as HTTP Basic auth instead of form fields.
    pub basic_auth: bool,

    // ── Crypto ──────────────────────────────────────────────────────────
    /// 32-byte base64-encoded key for AES-256-GCM. Unset means refresh
    /// tokens are stored in cleartext.
    pub master_key: Option<String>,

    // ── Behaviour ───────────────────────────────────────────────────────
    pub http_timeout: Duration,
    pub max_attempts: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL is required (PostgreSQL connection string)")?,

            token_url: std::env::var("TOKEN_URL")
                .context("TOKEN_URL is required (OAuth 2.0 token endpoint)")?,
            client_id: std::env::var("CLIENT_ID").context("CLIENT_ID is required")?,
            client_secret: std::env::var("CLIENT_SECRET").context("CLIENT_SECRET is required")?,
            basic_auth: std::env::var("TOKEN_BASIC_AUTH")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),

            master_key: std::env::var("MASTER_KEY").ok().filter(|k| !k.is_empty()),

            http_timeout: Duration::from_secs(
                std::env::var("HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".into())
                    .parse()
                    .context("Invalid HTTP_TIMEOUT_SECS")?,
            ),
            max_attempts: match std::env::var("MAX_ATTEMPTS") {
                Ok(v) => v.parse().context("Invalid MAX_ATTEMPTS")?,
                Err(_) => DEFAULT_MAX_ATTEMPTS,
            },
        })
    }
}
