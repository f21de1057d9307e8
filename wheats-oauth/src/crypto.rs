//! Secret hashing and token generation
//!
//! Client secrets and user passwords are stored as salted SHA-256 hashes
//! and verified with a constant-time comparison. Authorization codes and
//! token values are random strings drawn from the base64url alphabet.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;

/// Salt for secret hashing (32 bytes = 256 bits).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Salt(pub [u8; 32]);

impl Salt {
    /// Create a new random salt.
    pub fn new() -> Self {
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);
        Salt(salt)
    }

    /// Decode a salt from its base64 form.
    pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(s)
            .map_err(|e| CryptoError::InvalidSalt(format!("Invalid base64: {e}")))?;

        if bytes.len() != 32 {
            return Err(CryptoError::InvalidSalt(format!(
                "Salt must be 32 bytes, got {}",
                bytes.len()
            )));
        }

        let mut salt = [0u8; 32];
        salt.copy_from_slice(&bytes);
        Ok(Salt(salt))
    }

    /// Encode the salt as base64.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl Default for Salt {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// Crypto errors
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Salt could not be decoded.
    #[error("Invalid salt: {0}")]
    InvalidSalt(String),
}

/// A salted SHA-256 digest of a client secret or user password.
///
/// hash = SHA256(secret + ":" + salt)
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SecretHash {
    salt: Salt,
    digest: [u8; 32],
}

impl SecretHash {
    /// Hash a plaintext secret with a fresh random salt.
    pub fn new(secret: &str) -> Self {
        let salt = Salt::new();
        let digest = Self::digest(secret, &salt);
        Self { salt, digest }
    }

    /// Verify a candidate secret in constant time.
    pub fn verify(&self, candidate: &str) -> bool {
        let computed = Self::digest(candidate, &self.salt);
        computed.ct_eq(&self.digest).into()
    }

    fn digest(secret: &str, salt: &Salt) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.update(b":");
        hasher.update(salt.0);
        hasher.finalize().into()
    }
}

const TOKEN_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Generate a random string of `len` characters from the base64url
/// alphabet. 64 symbols per character, so 32 characters carry 192 bits
/// of entropy - comfortably above the 128-bit floor for codes.
pub fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..TOKEN_CHARSET.len());
            TOKEN_CHARSET[idx] as char
        })
        .collect()
}

/// Generate an authorization code (32 chars).
pub fn generate_authorization_code() -> String {
    random_token(32)
}

/// Generate an access or refresh token value (48 chars).
pub fn generate_token_value() -> String {
    random_token(48)
}

/// Safe-to-log preview of a secret value: first 8 characters.
///
/// Token values must never appear whole in logs or error bodies.
pub fn token_preview(value: &str) -> &str {
    match value.char_indices().nth(8) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}
