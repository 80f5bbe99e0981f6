use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::Engine as _;
use rand::RngCore;

use super::CryptoService;
use crate::error::TokenError;

const NONCE_LEN: usize = 12;

/// AES-256-GCM encryption for refresh tokens at rest.
pub struct AesGcmCrypto {
    cipher: Aes256Gcm,
}

impl AesGcmCrypto {
    /// Create a new engine from a base64-encoded 32-byte key.
    pub fn new(master_key_b64: &str) -> Result<Self, TokenError> {
        let master_key = base64::engine::general_purpose::STANDARD
            .decode(master_key_b64.trim())
            .map_err(|e| TokenError::Config(format!("Invalid MASTER_KEY base64: {e}")))?;

        if master_key.len() != 32 {
            return Err(TokenError::Config(format!(
                "MASTER_KEY must be 32 bytes, got {}",
                master_key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&master_key)
            .map_err(|e| TokenError::Config(format!("Failed to init AES cipher: {e}")))?;

        Ok(Self { cipher })
    }
}

impl CryptoService for AesGcmCrypto {
    /// Returns base64(nonce || ciphertext).
    fn encrypt(&self, plaintext: &str) -> Result<String, TokenError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| TokenError::Crypto(format!("Encryption failed: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    fn decrypt(&self, encrypted_b64: &str) -> Result<String, TokenError> {
        let combined = base64::engine::general_purpose::STANDARD
            .decode(encrypted_b64)
            .map_err(|e| TokenError::Crypto(format!("Invalid base64: {e}")))?;

        if combined.len() < NONCE_LEN {
            return Err(TokenError::Crypto("Ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| TokenError::Crypto(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| TokenError::Crypto(format!("Invalid UTF-8 after decrypt: {e}")))
    }
}
