//! Random one-time secrets and their stored hashes.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

/// Characters used in order number suffixes (no 0/O or 1/I).
const ORDER_SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ORDER_SUFFIX_LENGTH: usize = 6;

/// Generate a 6-digit verification code.
#[must_use]
pub fn generate_verification_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

/// Generate a URL-safe password reset token from 32 random bytes.
#[must_use]
pub fn generate_reset_token() -> String {
    let mut bytes = [0_u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate the random part of an order number.
#[must_use]
pub fn generate_order_suffix() -> String {
    let mut rng = rand::rng();
    (0..ORDER_SUFFIX_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..ORDER_SUFFIX_ALPHABET.len());
            char::from(ORDER_SUFFIX_ALPHABET.get(idx).copied().unwrap_or(b'X'))
        })
        .collect()
}

/// Hash a one-time secret for storage.
///
/// `SHA-256(server_secret ":" token)`, hex encoded. Surrounding whitespace
/// in `token` is ignored.
#[must_use]
pub fn hash_token(server_secret: &SecretString, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(server_secret.expose_secret().as_bytes());
    hasher.update(b":");
    hasher.update(token.trim().as_bytes());
    hex::encode(hasher.finalize())
}
