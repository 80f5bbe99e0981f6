use std::time::Duration;

use crate::identity::Identity;

/// Unified error type for token lookup and authenticated HTTP calls.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    // ── Token Errors ────────────────────────────────────────────────────
    #[error("No usable token for identity {0}")]
    TokenNotFound(Identity),

    #[error("Request for identity {identity} aborted: no token")]
    NoToken {
        identity: Identity,
        #[source]
        source: Box<TokenError>,
    },

    // ── Storage Errors ──────────────────────────────────────────────────
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    // ── HTTP Errors ─────────────────────────────────────────────────────
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    // ── Setup ───────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TokenError {
    /// Wrap a lookup failure as a transport-level abort.
    pub fn no_token(identity: Identity, cause: TokenError) -> Self {
        TokenError::NoToken {
            identity,
            source: Box::new(cause),
        }
    }
}

impl From<sqlx::Error> for TokenError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        TokenError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for TokenError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            TokenError::InvalidRequest(e.to_string())
        } else {
            TokenError::Transport(e.to_string())
        }
    }
}

impl From<http::Error> for TokenError {
    fn from(e: http::Error) -> Self {
        TokenError::InvalidRequest(e.to_string())
    }
}

/// Failure of a single refresh-token exchange.
///
/// Never escapes the store's retry loop; it only decides whether the
/// credential that was tried gets invalidated.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    /// The authorization server refused the credential (revoked, expired,
    /// `invalid_grant`). Retrying the same refresh token is pointless.
    #[error("Refresh token rejected: {0}")]
    Rejected(String),

    /// The exchange could not be completed (network, 5xx, bad response).
    #[error("Token endpoint unavailable: {0}")]
    Unavailable(String),
}

impl ExchangeError {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ExchangeError::Rejected(_))
    }
}
