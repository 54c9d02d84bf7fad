//! The `{userId}:{grantId}:{secret}` token string format.
//!
//! Authorization codes, access tokens and refresh tokens all share this
//! shape. The embedded ids let a receiver compute the storage key in O(1)
//! without a secondary index; the secret supplies the entropy. Lookups are
//! keyed on SHA-256 of the entire string, so knowing `userId:grantId` alone
//! is insufficient.

use crate::crypto::{self, TOKEN_SECRET_LENGTH};

/// Error returned when a token string does not have the expected shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("malformed token string")]
pub struct MalformedToken;

/// The three segments of a token string.
///
/// Grant ids and secrets are generated alphanumeric and never contain `:`,
/// so parsing splits from the right and user ids containing `:` round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    /// The user the token was issued for.
    pub user_id: String,
    /// The grant the token belongs to.
    pub grant_id: String,
    /// The random secret segment.
    pub secret: String,
}

impl ParsedToken {
    /// Parse a token string into its segments.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedToken`] unless the string has three non-empty
    /// `:`-separated segments.
    pub fn parse(token: &str) -> Result<Self, MalformedToken> {
        let mut parts = token.rsplitn(3, ':');
        let secret = parts.next().ok_or(MalformedToken)?;
        let grant_id = parts.next().ok_or(MalformedToken)?;
        let user_id = parts.next().ok_or(MalformedToken)?;

        if user_id.is_empty() || grant_id.is_empty() || secret.is_empty() {
            return Err(MalformedToken);
        }

        Ok(Self {
            user_id: user_id.to_string(),
            grant_id: grant_id.to_string(),
            secret: secret.to_string(),
        })
    }
}

/// Mint a fresh token string for the given user and grant.
#[must_use]
pub fn mint_token_string(user_id: &str, grant_id: &str) -> String {
    let secret = crypto::random_string(TOKEN_SECRET_LENGTH);
    format!("{user_id}:{grant_id}:{secret}")
}

/// The lookup hash of a token string: SHA-256 of the entire string, hex
/// encoded.
#[must_use]
pub fn token_hash(token: &str) -> String {
    crypto::sha256_hex(token)
}
