use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this many seconds before their actual expiry.
pub const EXPIRY_SKEW_SECS: i64 = 10;

/// A set of tokens returned from the token endpoint after a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".into()
}

/// An access token with the refresh token that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    /// `None` means the server did not say when the token expires.
    pub expiry: Option<DateTime<Utc>>,
}

/// `now + secs`, or `None` when the lifetime is zero or past what a
/// timestamp can hold. An unrepresentable expiry is treated as unknown.
fn expiry_after(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    if secs == 0 {
        return None;
    }
    let lifetime = Duration::try_seconds(i64::try_from(secs).ok()?)?;
    now.checked_add_signed(lifetime)
}

impl Token {
    /// A token carrying only a refresh token, already expired so the first
    /// use forces an exchange.
    pub fn expired(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            token_type: default_token_type(),
            refresh_token: Some(refresh_token.into()),
            expiry: Some(Utc::now() - Duration::seconds(1)),
        }
    }

    /// Build a token from an exchange response issued at `now`.
    pub fn from_set(set: TokenSet, now: DateTime<Utc>) -> Self {
        let token_type = if set.token_type.is_empty() {
            default_token_type()
        } else {
            set.token_type
        };
        Self {
            access_token: set.access_token,
            token_type,
            refresh_token: set.refresh_token.filter(|rt| !rt.is_empty()),
            expiry: set.expires_in.and_then(|secs| expiry_after(now, secs)),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        // Servers are picky about the casing of the scheme.
        let scheme = if self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{scheme} {}", self.access_token)
    }
}
