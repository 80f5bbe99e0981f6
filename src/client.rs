//! Shared HTTP client that authenticates each call as a given identity.

use bytes::Bytes;
use http::Method;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TokenError;
use crate::identity::{with_identity, Identity};
use crate::store::TokenStore;
use crate::transport::{AuthTransport, ReqwestTransport, Request, Response, Transport};

/// End-to-end deadline per call unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One client for many accounts. Each call names the identity it is made
/// for; the bearer token is looked up (and refreshed) per call.
///
/// The timeout covers the whole call: token lookup, any refresh exchange and
/// history reads/writes, and the request itself.
#[derive(Clone)]
pub struct TokenClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl TokenClient {
    pub fn new(store: Arc<TokenStore>) -> Self {
        let transport = AuthTransport::new(ReqwestTransport::default(), store);
        Self::with_transport(Arc::new(transport), DEFAULT_TIMEOUT)
    }

    pub fn with_transport(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `request` on behalf of `identity`.
    pub async fn send(&self, identity: &Identity, request: Request) -> Result<Response, TokenError> {
        self.execute(with_identity(request, identity.clone())).await
    }

    /// Send `request` without credentials.
    pub async fn send_anonymous(&self, request: Request) -> Result<Response, TokenError> {
        self.execute(request).await
    }

    pub async fn get(&self, identity: &Identity, url: &str) -> Result<Response, TokenError> {
        self.call(identity, Method::GET, url, Bytes::new()).await
    }

    pub async fn post(
        &self,
        identity: &Identity,
        url: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response, TokenError> {
        self.call(identity, Method::POST, url, body.into()).await
    }

    pub async fn put(
        &self,
        identity: &Identity,
        url: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response, TokenError> {
        self.call(identity, Method::PUT, url, body.into()).await
    }

    pub async fn patch(
        &self,
        identity: &Identity,
        url: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response, TokenError> {
        self.call(identity, Method::PATCH, url, body.into()).await
    }

    pub async fn delete(&self, identity: &Identity, url: &str) -> Result<Response, TokenError> {
        self.call(identity, Method::DELETE, url, Bytes::new()).await
    }

    async fn call(
        &self,
        identity: &Identity,
        method: Method,
        url: &str,
        body: Bytes,
    ) -> Result<Response, TokenError> {
        let request = http::Request::builder().method(method).uri(url).body(body)?;
        self.send(identity, request).await
    }

    async fn execute(&self, request: Request) -> Result<Response, TokenError> {
        match tokio::time::timeout(self.timeout, self.transport.round_trip(request)).await {
            Ok(result) => result,
            Err(_) => Err(TokenError::Timeout(self.timeout)),
        }
    }
}
