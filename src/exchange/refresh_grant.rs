use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::TokenExchanger;
use crate::error::{ExchangeError, TokenError};
use crate::token::TokenSet;

/// How client credentials are presented to the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `client_id` / `client_secret` form parameters.
    InParams,
    /// HTTP Basic authentication.
    InHeader,
}

/// A token endpoint and the way it expects client credentials.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub token_url: Url,
    pub auth_style: AuthStyle,
}

impl Endpoint {
    pub fn new(token_url: &str, auth_style: AuthStyle) -> Result<Self, TokenError> {
        let token_url = Url::parse(token_url)
            .map_err(|e| TokenError::Config(format!("Invalid token URL {token_url}: {e}")))?;
        Ok(Self {
            token_url,
            auth_style,
        })
    }

    pub fn google() -> Result<Self, TokenError> {
        Self::new("https://oauth2.googleapis.com/token", AuthStyle::InParams)
    }

    /// Zoom wants client credentials in a Basic auth header.
    pub fn zoom() -> Result<Self, TokenError> {
        Self::new("https://zoom.us/oauth/token", AuthStyle::InHeader)
    }
}

const INVALID_GRANT: &str = "invalid_grant";

// Error body per RFC 6749 §5.2
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// `grant_type=refresh_token` exchange against a standard OAuth 2.0 token endpoint.
pub struct RefreshGrantExchanger {
    client_id: String,
    client_secret: String,
    endpoint: Endpoint,
    http: reqwest::Client,
}

impl RefreshGrantExchanger {
    pub fn new(
        client_id: String,
        client_secret: String,
        endpoint: Endpoint,
        timeout: Duration,
    ) -> Result<Self, TokenError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TokenError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client_id,
            client_secret,
            endpoint,
            http,
        })
    }
}

#[async_trait]
impl TokenExchanger for RefreshGrantExchanger {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenSet, ExchangeError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let mut request = self.http.post(self.endpoint.token_url.clone());
        match self.endpoint.auth_style {
            AuthStyle::InParams => {
                form.push(("client_id", self.client_id.as_str()));
                form.push(("client_secret", self.client_secret.as_str()));
            }
            AuthStyle::InHeader => {
                request = request.basic_auth(&self.client_id, Some(&self.client_secret));
            }
        }

        let resp = request
            .form(&form)
            .send()
            .await
            .map_err(|e| ExchangeError::Unavailable(format!("Refresh request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }

        let token_set: TokenSet = resp.json().await.map_err(|e| {
            ExchangeError::Unavailable(format!("Failed to parse refresh response: {e}"))
        })?;

        if token_set.access_token.is_empty() {
            return Err(ExchangeError::Unavailable(
                "Refresh response carried no access token".into(),
            ));
        }

        Ok(token_set)
    }
}

/// Only `invalid_grant` condemns the refresh token itself. Other error codes
/// (`invalid_client`, `unauthorized_client`, ...) and bare statuses point at
/// the client registration or the server, not at the stored credential.
fn classify(status: StatusCode, body: &str) -> ExchangeError {
    let Ok(err) = serde_json::from_str::<ErrorResponse>(body) else {
        return ExchangeError::Unavailable(format!("HTTP {status}: {body}"));
    };

    let reason = match err.error_description {
        Some(desc) => format!("{}: {desc}", err.error),
        None => err.error.clone(),
    };
    if err.error == INVALID_GRANT {
        ExchangeError::Rejected(reason)
    } else {
        ExchangeError::Unavailable(format!("HTTP {status}: {reason}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn exchanger(server: &MockServer, auth_style: AuthStyle) -> RefreshGrantExchanger {
        let endpoint = Endpoint::new(&format!("{}/oauth/token", server.uri()), auth_style).unwrap();
        RefreshGrantExchanger::new(
            "client".into(),
            "secret".into(),
            endpoint,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r0"))
            .and(body_string_contains("client_id=client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A",
                "refresh_token": "r0b",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let set = exchanger(&server, AuthStyle::InParams)
            .exchange("r0")
            .await
            .unwrap();
        assert_eq!(set.access_token, "A");
        assert_eq!(set.refresh_token.as_deref(), Some("r0b"));
        assert_eq!(set.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn test_exchange_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A",
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let set = exchanger(&server, AuthStyle::InHeader)
            .exchange("r0")
            .await
            .unwrap();
        assert_eq!(set.access_token, "A");
        assert!(set.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_invalid_grant_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let err = exchanger(&server, AuthStyle::InParams)
            .exchange("r1")
            .await
            .unwrap_err();
        assert!(err.is_rejected());
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_invalid_client_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "The OAuth client was not found."
            })))
            .mount(&server)
            .await;

        let err = exchanger(&server, AuthStyle::InParams)
            .exchange("r1")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Unavailable(_)));
        assert!(err.to_string().contains("invalid_client"));
    }

    #[test]
    fn test_classify_by_error_code() {
        let body = |code: &str| format!(r#"{{"error":"{code}"}}"#);

        assert!(classify(StatusCode::BAD_REQUEST, &body("invalid_grant")).is_rejected());
        assert!(classify(StatusCode::UNAUTHORIZED, &body("invalid_grant")).is_rejected());
        assert!(!classify(StatusCode::BAD_REQUEST, &body("unauthorized_client")).is_rejected());
        assert!(!classify(StatusCode::UNAUTHORIZED, &body("invalid_client")).is_rejected());
        assert!(!classify(StatusCode::FORBIDDEN, "").is_rejected());
        assert!(!classify(StatusCode::UNAUTHORIZED, "<html>denied</html>").is_rejected());
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
            .mount(&server)
            .await;

        let err = exchanger(&server, AuthStyle::InParams)
            .exchange("r1")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Unavailable(_)));
    }

    #[test]
    fn test_presets() {
        assert_eq!(Endpoint::google().unwrap().auth_style, AuthStyle::InParams);
        assert_eq!(Endpoint::zoom().unwrap().auth_style, AuthStyle::InHeader);
    }

    #[test]
    fn test_invalid_endpoint_url() {
        assert!(matches!(
            Endpoint::new("not a url", AuthStyle::InParams),
            Err(TokenError::Config(_))
        ));
    }
}
