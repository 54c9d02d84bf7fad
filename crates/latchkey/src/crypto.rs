//! Cryptographic primitives for token and props handling.
//!
//! Three mechanisms live here:
//!
//! - Random identifier / secret generation (`[A-Za-z0-9]`, CSPRNG).
//! - AES-256-GCM encryption of per-grant application props under a key
//!   generated once per grant.
//! - Token-keyed wrapping: the props key is AES-KW wrapped under a key
//!   derived as `HMAC-SHA-256(pepper, token_string)`. The wrapped blob is
//!   stored; the unwrapped key is only recoverable by presenting the
//!   unhashed token string.
//!
//! The pepper is a fixed domain-separation constant, not a secret: wrap-key
//! derivation additionally requires the token string, so its disclosure does
//! not weaken the scheme. It must stay stable for the lifetime of a
//! deployment or every stored wrapped key becomes unrecoverable.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use aes_kw::KekAes256;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore, distributions::Alphanumeric};
use sha2::{Digest, Sha256};

use crate::OAuthResult;
use crate::error::OAuthError;

type HmacSha256 = Hmac<Sha256>;

/// Key size for AES-256 (256 bits).
pub const KEY_SIZE: usize = 32;

/// Length of the random secret segment of a token string.
pub const TOKEN_SECRET_LENGTH: usize = 32;

/// Domain-separation constant for wrap-key derivation. 32 bytes, fixed for
/// the lifetime of a deployment.
const WRAP_KEY_PEPPER: [u8; KEY_SIZE] = *b"latchkey-props-wrapping-pepper-1";

/// All-zero AES-GCM IV. Safe only because each props key is generated fresh
/// per grant and encrypts exactly one plaintext; re-encrypting props under
/// the same key would require switching to a random IV.
const ZERO_IV: [u8; 12] = [0u8; 12];

/// Generate a random string of the given length from `[A-Za-z0-9]` using a
/// cryptographically secure RNG.
#[must_use]
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// SHA-256 of the input, hex encoded.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh 256-bit props-encryption key.
///
/// The key exists in memory only during issuance and during a request that
/// presents a live token; it is never written to storage unwrapped.
#[must_use]
pub fn generate_props_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Encrypt application props with AES-256-GCM under the given key.
///
/// Returns the ciphertext (including the GCM tag) as standard base64.
///
/// # Errors
///
/// Returns `OAuthError::Crypto` if serialization or encryption fails.
pub fn encrypt_props(
    key: &[u8; KEY_SIZE],
    props: &serde_json::Value,
) -> OAuthResult<String> {
    let plaintext = serde_json::to_vec(props)
        .map_err(|e| OAuthError::crypto(format!("Failed to serialize props: {e}")))?;

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| OAuthError::crypto(format!("Failed to create cipher: {e}")))?;
    let nonce = Nonce::from_slice(&ZERO_IV);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_ref())
        .map_err(|e| OAuthError::crypto(format!("Props encryption failed: {e}")))?;

    Ok(BASE64.encode(ciphertext))
}

/// Decrypt application props previously produced by [`encrypt_props`].
///
/// # Errors
///
/// Returns `OAuthError::Crypto` if the ciphertext is malformed, the key is
/// wrong, or the plaintext is not valid JSON.
pub fn decrypt_props(
    key: &[u8; KEY_SIZE],
    encrypted: &str,
) -> OAuthResult<serde_json::Value> {
    let ciphertext = BASE64
        .decode(encrypted)
        .map_err(|e| OAuthError::crypto(format!("Invalid props ciphertext base64: {e}")))?;

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| OAuthError::crypto(format!("Failed to create cipher: {e}")))?;
    let nonce = Nonce::from_slice(&ZERO_IV);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| OAuthError::crypto(format!("Props decryption failed: {e}")))?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| OAuthError::crypto(format!("Decrypted props are not valid JSON: {e}")))
}

/// Derive the AES-KW wrapping key for a token string.
fn derive_wrapping_key(token: &str) -> OAuthResult<[u8; KEY_SIZE]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(&WRAP_KEY_PEPPER)
        .map_err(|e| OAuthError::crypto(format!("Failed to initialize HMAC: {e}")))?;
    mac.update(token.as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    Ok(key)
}

/// Wrap the props key under a key derived from the token string.
///
/// Returns the 40-byte AES-KW blob as standard base64.
///
/// # Errors
///
/// Returns `OAuthError::Crypto` if wrapping fails.
pub fn wrap_props_key(token: &str, props_key: &[u8; KEY_SIZE]) -> OAuthResult<String> {
    let kek = KekAes256::new(&derive_wrapping_key(token)?.into());
    let wrapped = kek
        .wrap_vec(props_key)
        .map_err(|e| OAuthError::crypto(format!("Key wrap failed: {e}")))?;
    Ok(BASE64.encode(wrapped))
}

/// Unwrap a props key using the presented token string.
///
/// # Errors
///
/// Returns `OAuthError::Crypto` if the blob is malformed or the token does
/// not match the one the key was wrapped under (AES-KW integrity check).
pub fn unwrap_props_key(token: &str, wrapped: &str) -> OAuthResult<[u8; KEY_SIZE]> {
    let blob = BASE64
        .decode(wrapped)
        .map_err(|e| OAuthError::crypto(format!("Invalid wrapped key base64: {e}")))?;

    let kek = KekAes256::new(&derive_wrapping_key(token)?.into());
    let unwrapped = kek
        .unwrap_vec(&blob)
        .map_err(|e| OAuthError::crypto(format!("Key unwrap failed: {e}")))?;

    if unwrapped.len() != KEY_SIZE {
        return Err(OAuthError::crypto("Unwrapped key has unexpected length"));
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&unwrapped);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_random_string_alphabet_and_length() {
        let s = random_string(TOKEN_SECRET_LENGTH);
        assert_eq!(s.len(), TOKEN_SECRET_LENGTH);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_random_string_uniqueness() {
        let a = random_string(32);
        let b = random_string(32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_props_roundtrip() {
        let key = generate_props_key();
        let props = json!({"sub": "u1", "roles": ["admin"]});

        let encrypted = encrypt_props(&key, &props).unwrap();
        let decrypted = decrypt_props(&key, &encrypted).unwrap();
        assert_eq!(decrypted, props);
    }

    #[test]
    fn test_props_wrong_key_fails() {
        let key = generate_props_key();
        let other = generate_props_key();
        let encrypted = encrypt_props(&key, &json!({"a": 1})).unwrap();

        assert!(decrypt_props(&other, &encrypted).is_err());
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let props_key = generate_props_key();
        let token = "u1:abcd1234abcd1234:s3cr3t";

        let wrapped = wrap_props_key(token, &props_key).unwrap();
        let unwrapped = unwrap_props_key(token, &wrapped).unwrap();
        assert_eq!(unwrapped, props_key);
    }

    #[test]
    fn test_unwrap_with_wrong_token_fails() {
        let props_key = generate_props_key();
        let wrapped = wrap_props_key("u1:g1:secret-a", &props_key).unwrap();

        assert!(unwrap_props_key("u1:g1:secret-b", &wrapped).is_err());
    }

    #[test]
    fn test_wrapped_key_differs_per_token() {
        let props_key = generate_props_key();
        let w1 = wrap_props_key("u1:g1:token-one", &props_key).unwrap();
        let w2 = wrap_props_key("u1:g1:token-two", &props_key).unwrap();
        assert_ne!(w1, w2);
    }

    #[test]
    fn test_props_undecryptable_without_token() {
        // An adversary with full store access holds the ciphertext and the
        // wrapped key, but not the token string: a key derived from any
        // guessed token must fail the AES-KW integrity check.
        let props_key = generate_props_key();
        let encrypted = encrypt_props(&props_key, &json!({"secret": true})).unwrap();
        let _wrapped = wrap_props_key("u1:g1:the-real-token", &props_key).unwrap();

        for guess in ["u1:g1:guess", "", "u1:g1:the-real-token2"] {
            let derived = derive_wrapping_key(guess).unwrap();
            assert!(decrypt_props(&derived, &encrypted).is_err());
        }
    }
}
