//! Authorization server metadata discovery (RFC 8414).

use axum::http::{Method, StatusCode};
use axum::response::Response;
use serde::Serialize;
use tracing::warn;
use url::Url;

use crate::config::ProviderConfig;
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::handler::HandlerRequest;
use crate::http::{json_response, oauth_error_response, request_origin};

/// Path of the discovery document.
pub const WELL_KNOWN_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

/// Grant types every deployment supports.
pub const GRANT_TYPES_SUPPORTED: [&str; 2] = ["authorization_code", "refresh_token"];

/// The only supported response mode.
pub const RESPONSE_MODES_SUPPORTED: [&str; 1] = ["query"];

/// Client authentication methods accepted at the token endpoint.
pub const TOKEN_ENDPOINT_AUTH_METHODS_SUPPORTED: [&str; 3] =
    ["client_secret_basic", "client_secret_post", "none"];

/// PKCE challenge methods accepted at the token endpoint.
pub const CODE_CHALLENGE_METHODS_SUPPORTED: [&str; 2] = ["plain", "S256"];

/// The discovery document served at
/// `/.well-known/oauth-authorization-server`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationServerMetadata {
    /// The issuer identifier: the origin of the token endpoint.
    pub issuer: String,
    /// Fully-qualified authorization endpoint.
    pub authorization_endpoint: String,
    /// Fully-qualified token endpoint.
    pub token_endpoint: String,
    /// Fully-qualified registration endpoint, when enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    /// Advertised scopes, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    /// `code`, plus `token` when the implicit flow is enabled.
    pub response_types_supported: Vec<String>,
    /// Always `["query"]`.
    pub response_modes_supported: Vec<String>,
    /// Always `["authorization_code", "refresh_token"]`.
    pub grant_types_supported: Vec<String>,
    /// Token endpoint client authentication methods.
    pub token_endpoint_auth_methods_supported: Vec<String>,
    /// PKCE challenge methods.
    pub code_challenge_methods_supported: Vec<String>,
    /// Same URL as the token endpoint.
    pub revocation_endpoint: String,
}

impl AuthorizationServerMetadata {
    /// Build the document for a request arriving at the given origin.
    pub(crate) fn build(config: &ProviderConfig, origin: &Url) -> OAuthResult<Self> {
        let token_endpoint = config.token_endpoint.resolve(origin)?;
        let issuer = Url::parse(&token_endpoint)
            .map_err(|e| OAuthError::configuration(format!("Invalid token endpoint URL: {e}")))?
            .origin()
            .ascii_serialization();

        let mut response_types = vec!["code".to_string()];
        if config.allow_implicit_flow {
            response_types.push("token".to_string());
        }

        Ok(Self {
            issuer,
            authorization_endpoint: config.authorize_endpoint.resolve(origin)?,
            token_endpoint: token_endpoint.clone(),
            registration_endpoint: config
                .registration_endpoint
                .as_ref()
                .map(|endpoint| endpoint.resolve(origin))
                .transpose()?,
            scopes_supported: config.scopes_supported.clone(),
            response_types_supported: response_types,
            response_modes_supported: RESPONSE_MODES_SUPPORTED
                .iter()
                .map(ToString::to_string)
                .collect(),
            grant_types_supported: GRANT_TYPES_SUPPORTED
                .iter()
                .map(ToString::to_string)
                .collect(),
            token_endpoint_auth_methods_supported: TOKEN_ENDPOINT_AUTH_METHODS_SUPPORTED
                .iter()
                .map(ToString::to_string)
                .collect(),
            code_challenge_methods_supported: CODE_CHALLENGE_METHODS_SUPPORTED
                .iter()
                .map(ToString::to_string)
                .collect(),
            revocation_endpoint: token_endpoint,
        })
    }
}

/// Handle one discovery request.
pub(crate) async fn handle(config: &ProviderConfig, request: HandlerRequest) -> Response {
    if request.method() != Method::GET {
        return oauth_error_response(&OAuthError::invalid_request_with_status(
            "Metadata endpoint requires GET",
            405,
        ));
    }

    match request_origin(request.uri(), request.headers())
        .and_then(|origin| AuthorizationServerMetadata::build(config, &origin))
    {
        Ok(metadata) => json_response(StatusCode::OK, &metadata),
        Err(error) => {
            warn!(error = %error, "Metadata request failed");
            oauth_error_response(&error)
        }
    }
}
