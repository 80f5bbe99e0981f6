use async_trait::async_trait;
use http::header::{HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use tracing::warn;

use super::{Request, Response, Transport};
use crate::error::TokenError;
use crate::identity::identity_of;
use crate::store::TokenStore;
use crate::token::Token;

/// Stored refresh tokens tried per request before giving up.
pub const TOKEN_ATTEMPTS: usize = 2;

/// Attaches the bearer token of the request's identity before handing the
/// request to the inner transport. Requests without an identity pass through
/// untouched.
pub struct AuthTransport<T> {
    inner: T,
    store: Arc<TokenStore>,
}

impl<T: Transport> AuthTransport<T> {
    pub fn new(inner: T, store: Arc<TokenStore>) -> Self {
        Self { inner, store }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }
}

#[async_trait]
impl<T: Transport> Transport for AuthTransport<T> {
    async fn round_trip(&self, request: Request) -> Result<Response, TokenError> {
        let Some(identity) = identity_of(&request).cloned() else {
            return self.inner.round_trip(request).await;
        };

        // On failure the request, body included, is dropped here unsent.
        let token = match self.store.get_token_with_retry(&identity, TOKEN_ATTEMPTS).await {
            Ok(token) => token,
            Err(e) => {
                warn!(identity = %identity, "No token, request aborted: {e}");
                return Err(TokenError::no_token(identity, e));
            }
        };

        let request = authorize(request, &token)?;
        self.inner.round_trip(request).await
    }
}

/// Rebuild `request` with the token's `Authorization` header, replacing any
/// the caller set.
fn authorize(request: Request, token: &Token) -> Result<Request, TokenError> {
    let mut value = HeaderValue::try_from(token.authorization())
        .map_err(|e| TokenError::InvalidRequest(format!("Access token is not a valid header value: {e}")))?;
    value.set_sensitive(true);

    let (mut parts, body) = request.into_parts();
    parts.headers.insert(AUTHORIZATION, value);
    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExchangeError;
    use crate::exchange::TokenExchanger;
    use crate::identity::{with_identity, Identity};
    use crate::store::{MemoryRefreshTokenStore, RefreshTokenPersistence};
    use crate::token::TokenSet;
    use bytes::Bytes;
    use http::{HeaderMap, Method, Uri};
    use std::sync::Mutex;

    struct Forwarded {
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Forwarded>>,
    }

    #[async_trait]
    impl Transport for Arc<Recorder> {
        async fn round_trip(&self, request: Request) -> Result<Response, TokenError> {
            let (parts, body) = request.into_parts();
            self.seen.lock().unwrap().push(Forwarded {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
            });
            Ok(http::Response::new("ok").into())
        }
    }

    struct StaticExchanger;

    #[async_trait]
    impl TokenExchanger for StaticExchanger {
        async fn exchange(&self, refresh_token: &str) -> Result<TokenSet, ExchangeError> {
            if refresh_token != "r0" {
                return Err(ExchangeError::Rejected("invalid_grant".into()));
            }
            Ok(TokenSet {
                access_token: "A".into(),
                refresh_token: None,
                token_type: "bearer".into(),
                expires_in: Some(3600),
                scope: None,
            })
        }
    }

    async fn transport() -> (AuthTransport<Arc<Recorder>>, Arc<Recorder>) {
        let persistent = Arc::new(MemoryRefreshTokenStore::new());
        persistent
            .insert_refresh_token(&Identity::new("196"), "r0")
            .await
            .unwrap();
        let store = Arc::new(TokenStore::new(Arc::new(StaticExchanger), persistent));
        let recorder = Arc::new(Recorder::default());
        (AuthTransport::new(recorder.clone(), store), recorder)
    }

    fn request() -> Request {
        http::Request::post("https://api.example.com/v2/users/me/meetings")
            .header("content-type", "application/json")
            .header("x-request-id", "42")
            .body(Bytes::from_static(b"{\"type\":2}"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_request_passes_through() {
        let (transport, recorder) = transport().await;

        transport.round_trip(request()).await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        let expected = request();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, *expected.method());
        assert_eq!(seen[0].uri, *expected.uri());
        assert_eq!(seen[0].headers, *expected.headers());
        assert_eq!(seen[0].body, *expected.body());
        assert!(seen[0].headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_identity_gets_bearer_token() {
        let (transport, recorder) = transport().await;

        let resp = transport
            .round_trip(with_identity(request(), Identity::new("196")))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let seen = recorder.seen.lock().unwrap();
        let fwd = &seen[0];
        assert_eq!(fwd.headers.get(AUTHORIZATION).unwrap(), "Bearer A");
        assert!(fwd.headers.get(AUTHORIZATION).unwrap().is_sensitive());
        assert_eq!(fwd.headers.get("x-request-id").unwrap(), "42");
        assert_eq!(fwd.headers.len(), request().headers().len() + 1);
        assert_eq!(fwd.method, Method::POST);
        assert_eq!(fwd.body, Bytes::from_static(b"{\"type\":2}"));
    }

    #[tokio::test]
    async fn test_caller_authorization_is_replaced() {
        let (transport, recorder) = transport().await;
        let mut req = with_identity(request(), Identity::new("196"));
        req.headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));

        transport.round_trip(req).await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        let values: Vec<_> = seen[0].headers.get_all(AUTHORIZATION).iter().collect();
        assert_eq!(values, vec!["Bearer A"]);
    }

    #[tokio::test]
    async fn test_unknown_identity_aborts_before_send() {
        let (transport, recorder) = transport().await;

        let err = transport
            .round_trip(with_identity(request(), Identity::new("nobody")))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TokenError::NoToken { ref identity, .. } if identity.as_str() == "nobody"
        ));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}
