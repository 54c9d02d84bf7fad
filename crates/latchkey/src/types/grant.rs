//! Grant record: a user's authorization of a client.

use serde::{Deserialize, Serialize};

/// A persisted grant, keyed `grant:{userId}:{grantId}`.
///
/// While the grant still holds an unredeemed authorization code the record
/// carries a 10-minute TTL; redemption clears the code slot and re-writes
/// the record without a TTL.
///
/// Slot invariants:
/// - at most one auth-code slot; clearing it is irreversible
/// - at most two simultaneously valid refresh slots (current + previous)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// 16-character alphanumeric grant identifier.
    pub id: String,

    /// The client the user authorized.
    pub client_id: String,

    /// The user who authorized.
    pub user_id: String,

    /// Granted scope, possibly narrower than requested.
    pub scope: Vec<String>,

    /// Application-supplied metadata, visible to management APIs.
    pub metadata: serde_json::Value,

    /// AES-GCM ciphertext of application props, standard base64.
    pub encrypted_props: String,

    /// Unix seconds at which the grant was created.
    pub created_at: i64,

    /// SHA-256 hex of the unredeemed authorization code. Present iff the
    /// code has not been redeemed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_code_id: Option<String>,

    /// Props key wrapped under the authorization code string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_code_wrapped_key: Option<String>,

    /// PKCE challenge from the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE challenge method (`plain` or `S256`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    /// SHA-256 hex of the current refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_id: Option<String>,

    /// Props key wrapped under the current refresh token string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_wrapped_key: Option<String>,

    /// SHA-256 hex of the previous refresh token (grace window).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_refresh_token_id: Option<String>,

    /// Props key wrapped under the previous refresh token string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_refresh_token_wrapped_key: Option<String>,
}

impl Grant {
    /// Returns `true` while the grant holds an unredeemed authorization
    /// code.
    #[must_use]
    pub fn has_auth_code(&self) -> bool {
        self.auth_code_id.is_some()
    }

    /// Project the grant to its management-facing summary: no encrypted
    /// data, no token material.
    #[must_use]
    pub fn summary(&self) -> GrantSummary {
        GrantSummary {
            id: self.id.clone(),
            client_id: self.client_id.clone(),
            user_id: self.user_id.clone(),
            scope: self.scope.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
        }
    }
}

/// Management-facing projection of a [`Grant`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantSummary {
    /// Grant identifier.
    pub id: String,
    /// The client the user authorized.
    pub client_id: String,
    /// The user who authorized.
    pub user_id: String,
    /// Granted scope.
    pub scope: Vec<String>,
    /// Application-supplied metadata.
    pub metadata: serde_json::Value,
    /// Unix seconds at which the grant was created.
    pub created_at: i64,
}
