//! Refresh-token exchange against an authorization server.

mod refresh_grant;

pub use refresh_grant::{AuthStyle, Endpoint, RefreshGrantExchanger};

use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::token::TokenSet;

/// Trades a refresh token for a fresh access token.
///
/// The response may carry a new refresh token, in which case the one presented
/// should be considered rotated out.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenSet, ExchangeError>;
}
