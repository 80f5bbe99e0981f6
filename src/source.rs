//! Token sources: something that hands out a valid access token, refreshing
//! it when needed.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::ExchangeError;
use crate::exchange::TokenExchanger;
use crate::token::Token;

#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a valid token, performing a refresh exchange if the current one
    /// has expired.
    async fn token(&self) -> Result<Token, ExchangeError>;
}

/// Reuses its current token until it expires, then exchanges the refresh
/// token for a new one.
pub struct RefreshingTokenSource {
    exchanger: Arc<dyn TokenExchanger>,
    // Held across the exchange so concurrent callers refresh once.
    current: Mutex<Token>,
}

impl RefreshingTokenSource {
    pub fn new(exchanger: Arc<dyn TokenExchanger>, token: Token) -> Self {
        Self {
            exchanger,
            current: Mutex::new(token),
        }
    }

    /// A source whose first `token()` call always hits the token endpoint.
    pub fn seeded(exchanger: Arc<dyn TokenExchanger>, refresh_token: &str) -> Self {
        Self::new(exchanger, Token::expired(refresh_token))
    }
}

#[async_trait]
impl TokenSource for RefreshingTokenSource {
    async fn token(&self) -> Result<Token, ExchangeError> {
        let mut current = self.current.lock().await;
        if current.is_valid() {
            return Ok(current.clone());
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            return Err(ExchangeError::Rejected(
                "token expired and no refresh token is available".into(),
            ));
        };

        let set = self.exchanger.exchange(&refresh_token).await?;
        let mut fresh = Token::from_set(set, Utc::now());
        // No refresh token in the response means the old one stays in force.
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token);
        }

        *current = fresh.clone();
        Ok(fresh)
    }
}
