//! Encryption at rest for persisted refresh tokens.

mod engine;

pub use engine::AesGcmCrypto;

use crate::error::TokenError;

/// Reversible transformation applied to refresh tokens before they are written
/// and after they are read back.
pub trait CryptoService: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, TokenError>;

    fn decrypt(&self, ciphertext: &str) -> Result<String, TokenError>;
}
