pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod identity;
mod lock;
pub mod source;
pub mod store;
pub mod token;
pub mod transport;

pub use client::TokenClient;
pub use config::Config;
pub use error::{ExchangeError, TokenError};
pub use identity::{identity_of, with_identity, Identity};
pub use store::TokenStore;
pub use token::Token;

use anyhow::Context;
use std::sync::Arc;

use crypto::{AesGcmCrypto, CryptoService};
use exchange::{AuthStyle, Endpoint, RefreshGrantExchanger};
use store::PgRefreshTokenStore;

/// Everything wired together from a [`Config`].
pub struct AppState {
    pub config: Config,
    pub history: Arc<PgRefreshTokenStore>,
    pub store: Arc<TokenStore>,
    pub client: TokenClient,
}

impl AppState {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let crypto: Option<Arc<dyn CryptoService>> = match &config.master_key {
            Some(key) => Some(Arc::new(AesGcmCrypto::new(key)?)),
            None => None,
        };

        let history = Arc::new(
            PgRefreshTokenStore::connect(&config.database_url, crypto)
                .await
                .context("connecting to the refresh token database")?,
        );

        let auth_style = if config.basic_auth {
            AuthStyle::InHeader
        } else {
            AuthStyle::InParams
        };
        let exchanger = RefreshGrantExchanger::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            Endpoint::new(&config.token_url, auth_style)?,
            config.http_timeout,
        )?;

        let store = Arc::new(
            TokenStore::new(Arc::new(exchanger), history.clone())
                .with_max_attempts(config.max_attempts),
        );
        let client = TokenClient::new(store.clone()).timeout(config.http_timeout);

        Ok(Self {
            config,
            history,
            store,
            client,
        })
    }
}
