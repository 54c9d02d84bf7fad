//! Key naming, JSON codec and TTL policy for the store.
//!
//! Key layout:
//!
//! - `client:{clientId}`: no TTL
//! - `grant:{userId}:{grantId}`: 10-minute TTL while holding an unredeemed
//!   authorization code, no TTL afterwards
//! - `token:{userId}:{grantId}:{tokenHash}`: TTL equal to the access-token
//!   lifetime

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::kv::{KvPutOptions, KvStore};

/// Prefix under which client records live.
pub const CLIENT_PREFIX: &str = "client:";

/// TTL in seconds for a grant holding an unredeemed authorization code.
pub const AUTH_CODE_TTL_SECS: u64 = 600;

/// Key of a client record.
#[must_use]
pub fn client_key(client_id: &str) -> String {
    format!("client:{client_id}")
}

/// Key of a grant record.
#[must_use]
pub fn grant_key(user_id: &str, grant_id: &str) -> String {
    format!("grant:{user_id}:{grant_id}")
}

/// Prefix covering all grants of a user.
#[must_use]
pub fn grant_prefix(user_id: &str) -> String {
    format!("grant:{user_id}:")
}

/// Key of an access-token record.
#[must_use]
pub fn token_key(user_id: &str, grant_id: &str, token_hash: &str) -> String {
    format!("token:{user_id}:{grant_id}:{token_hash}")
}

/// Prefix covering all access tokens of a grant.
#[must_use]
pub fn token_prefix(user_id: &str, grant_id: &str) -> String {
    format!("token:{user_id}:{grant_id}:")
}

/// Read and deserialize a JSON record.
///
/// # Errors
///
/// Returns `OAuthError::Storage` on store failure or a record that fails to
/// deserialize.
pub async fn get_json<T: DeserializeOwned>(
    kv: &dyn KvStore,
    key: &str,
) -> OAuthResult<Option<T>> {
    let raw = kv
        .get(key)
        .await
        .map_err(|e| OAuthError::storage(e.to_string()))?;

    match raw {
        Some(value) => serde_json::from_str(&value)
            .map(Some)
            .map_err(|e| OAuthError::storage(format!("Malformed record at {key}: {e}"))),
        None => Ok(None),
    }
}

/// Serialize and write a JSON record.
///
/// A `ttl` of `None` persists the key indefinitely, clearing any TTL a
/// previous write set.
///
/// # Errors
///
/// Returns `OAuthError::Storage` on serialization or store failure.
pub async fn put_json<T: Serialize>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<u64>,
) -> OAuthResult<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| OAuthError::storage(format!("Failed to serialize record for {key}: {e}")))?;
    kv.put(key, raw, KvPutOptions { expiration_ttl: ttl })
        .await
        .map_err(|e| OAuthError::storage(e.to_string()))
}

/// Delete a key.
///
/// # Errors
///
/// Returns `OAuthError::Storage` on store failure.
pub async fn delete(kv: &dyn KvStore, key: &str) -> OAuthResult<()> {
    kv.delete(key)
        .await
        .map_err(|e| OAuthError::storage(e.to_string()))
}
