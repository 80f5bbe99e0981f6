//! Outbound HTTP transports.
//!
//! A transport sends one request and returns the response. Transports stack:
//! [`AuthTransport`] decorates an inner transport with bearer credentials.

mod auth;

pub use auth::{AuthTransport, TOKEN_ATTEMPTS};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TokenError;

pub type Request = http::Request<Bytes>;
pub type Response = reqwest::Response;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`. The transport owns the request, body included, from
    /// here on.
    async fn round_trip(&self, request: Request) -> Result<Response, TokenError>;
}

/// Sends requests with a shared `reqwest::Client`.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn round_trip(&self, request: Request) -> Result<Response, TokenError> {
        let request = reqwest::Request::try_from(request)?;
        Ok(self.client.execute(request).await?)
    }
}
