//! Access-token record.

use serde::{Deserialize, Serialize};

/// Denormalized grant snapshot carried on every access-token record so API
/// validation is a single read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantSnapshot {
    /// The client the grant belongs to.
    pub client_id: String,
    /// Granted scope.
    pub scope: Vec<String>,
    /// AES-GCM ciphertext of application props.
    pub encrypted_props: String,
}

/// A persisted access token, keyed `token:{userId}:{grantId}:{tokenHash}`
/// with a TTL equal to the configured access-token lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRecord {
    /// SHA-256 hex of the token string.
    pub id: String,

    /// The grant the token belongs to.
    pub grant_id: String,

    /// The user the token was issued for.
    pub user_id: String,

    /// Unix seconds at which the token was minted.
    pub created_at: i64,

    /// Unix seconds at which the token expires. Always
    /// `created_at + accessTokenTTL`; the storage TTL matches.
    pub expires_at: i64,

    /// Props key wrapped under this token string.
    pub wrapped_encryption_key: String,

    /// Snapshot of the owning grant.
    pub grant: GrantSnapshot,
}

impl AccessTokenRecord {
    /// Returns `true` once the token has expired. The storage TTL normally
    /// removes the record first; this guards against a store serving past
    /// its TTL.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> AccessTokenRecord {
        AccessTokenRecord {
            id: "hash".to_string(),
            grant_id: "grantid123456789".to_string(),
            user_id: "u1".to_string(),
            created_at: 1_700_000_000,
            expires_at: 1_700_003_600,
            wrapped_encryption_key: "wrapped".to_string(),
            grant: GrantSnapshot {
                client_id: "clientid12345678".to_string(),
                scope: vec!["read".to_string()],
                encrypted_props: "AAAA".to_string(),
            },
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let record = sample_record();
        assert!(!record.is_expired(1_700_000_000));
        assert!(!record.is_expired(1_700_003_600));
        assert!(record.is_expired(1_700_003_601));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains(r#""grantId":"grantid123456789""#));
        assert!(json.contains(r#""wrappedEncryptionKey""#));
        assert!(json.contains(r#""encryptedProps""#));

        let back: AccessTokenRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.grant.client_id, record.grant.client_id);
        assert_eq!(back.expires_at, record.expires_at);
    }
}
