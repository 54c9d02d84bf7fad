//! OAuth client registration record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token endpoint authentication methods (RFC 6749 / OpenID Connect Core
/// section 9). `none` designates a public client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// Client secret via HTTP Basic Auth.
    #[default]
    ClientSecretBasic,

    /// Client secret in the request body.
    ClientSecretPost,

    /// No client authentication (public clients).
    None,
}

impl TokenEndpointAuthMethod {
    /// Parse an auth method from its wire representation.
    #[must_use]
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "client_secret_basic" => Some(Self::ClientSecretBasic),
            "client_secret_post" => Some(Self::ClientSecretPost),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Returns the string representation of the auth method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
            Self::None => "none",
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered OAuth client.
///
/// Persisted at `client:{clientId}` with no TTL. For confidential clients
/// `client_secret` holds the SHA-256 hex of the real secret; the plaintext
/// is returned exactly once at creation and never stored. Public client
/// records never carry a stored secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// 16-character alphanumeric client identifier.
    pub client_id: String,

    /// SHA-256 hex of the client secret. Present iff the client is
    /// confidential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Registered redirect URIs. Matching is whole-string equality.
    pub redirect_uris: Vec<String>,

    /// How the client authenticates at the token endpoint.
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,

    /// Grant types the client declared at registration.
    #[serde(default)]
    pub grant_types: Vec<String>,

    /// Response types the client declared at registration.
    #[serde(default)]
    pub response_types: Vec<String>,

    /// Human-readable client name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// URL of the client's logo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,

    /// URL of the client's home page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,

    /// URL of the client's privacy policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<String>,

    /// URL of the client's terms of service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,

    /// URL of the client's JWK Set document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Contact addresses for the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<String>>,

    /// Unix seconds at which the client was registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<i64>,
}

impl ClientInfo {
    /// Returns `true` if the client is public (no credential check at the
    /// token endpoint).
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method == TokenEndpointAuthMethod::None
    }

    /// Returns `true` if the given redirect URI is registered. Membership is
    /// whole-string equality; no prefix or pattern matching.
    #[must_use]
    pub fn redirect_uri_registered(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }
}
