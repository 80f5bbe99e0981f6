//! Per-request identity marker.
//!
//! The identity travels in the request's extensions. A request without one is
//! anonymous and goes out without credentials.

use std::fmt;

use http::{Extensions, Request};

/// Opaque key naming one account whose credentials are tracked separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Attach this identity to a request's extensions, replacing any previous one.
    pub fn attach(self, extensions: &mut Extensions) {
        extensions.insert(self);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Mark `request` as issued on behalf of `identity`.
pub fn with_identity<B>(mut request: Request<B>, identity: Identity) -> Request<B> {
    identity.attach(request.extensions_mut());
    request
}

/// The identity a request was issued for, if any.
pub fn identity_of<B>(request: &Request<B>) -> Option<&Identity> {
    request.extensions().get::<Identity>()
}
