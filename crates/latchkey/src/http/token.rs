//! The token endpoint.
//!
//! Handles `POST` with an `application/x-www-form-urlencoded` body. Client
//! credentials are taken from `Authorization: Basic` when present, else
//! from the `client_id` / `client_secret` form fields. Grant handling is
//! delegated to [`TokenIssuer`].

use std::sync::Arc;

use axum::body::to_bytes;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::handler::HandlerRequest;
use crate::http::{json_response, oauth_error_response};
use crate::kv::KvStore;
use crate::registry::ClientRegistry;
use crate::token::service::{CodeExchange, TokenIssuer, TokenResponse};
use crate::types::ClientInfo;

/// Upper bound on the form body; token requests are tiny.
const MAX_FORM_BODY_BYTES: usize = 64 * 1024;

/// Token request form fields.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenRequest {
    /// `authorization_code` or `refresh_token`.
    pub grant_type: String,

    /// Authorization code (authorization_code grant).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI, required when PKCE was not used at authorization.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE code verifier, required when PKCE was used.
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Client id (public clients or client_secret_post).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (client_secret_post).
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Refresh token (refresh_token grant).
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Handle one token-endpoint request.
pub(crate) async fn handle(
    config: &ProviderConfig,
    kv: Arc<dyn KvStore>,
    request: HandlerRequest,
) -> Response {
    match process(config, kv, request).await {
        Ok(response) => token_success_response(&response),
        Err(error) => {
            warn!(error = %error, "Token request failed");
            oauth_error_response(&error)
        }
    }
}

async fn process(
    config: &ProviderConfig,
    kv: Arc<dyn KvStore>,
    request: HandlerRequest,
) -> OAuthResult<TokenResponse> {
    if request.method() != Method::POST {
        return Err(OAuthError::invalid_request_with_status(
            "Token endpoint requires POST",
            405,
        ));
    }

    let (parts, body) = request.into_parts();

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with("application/x-www-form-urlencoded") {
        return Err(OAuthError::invalid_request(
            "Content-Type must be application/x-www-form-urlencoded",
        ));
    }

    let bytes = to_bytes(body, MAX_FORM_BODY_BYTES)
        .await
        .map_err(|_| OAuthError::invalid_request_with_status("Request body too large", 413))?;
    let form: TokenRequest = serde_urlencoded::from_bytes(&bytes)
        .map_err(|e| OAuthError::invalid_request(format!("Malformed form body: {e}")))?;

    debug!(grant_type = %form.grant_type, "Processing token request");

    // Basic credentials take precedence over form fields.
    let basic = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic_auth);
    let (client_id, client_secret) = match basic {
        Some((id, secret)) => (Some(id), Some(secret)),
        None => (form.client_id.clone(), form.client_secret.clone()),
    };

    let client = authenticate_client(kv.clone(), client_id.as_deref(), client_secret.as_deref())
        .await?;

    info!(
        client_id = %client.client_id,
        grant_type = %form.grant_type,
        "Client authenticated, processing grant"
    );

    let issuer = TokenIssuer::new(kv, config.access_token_ttl);
    match form.grant_type.as_str() {
        "authorization_code" => {
            let code = form
                .code
                .as_deref()
                .ok_or_else(|| OAuthError::invalid_request("Missing code"))?;
            issuer
                .exchange_authorization_code(
                    &client,
                    CodeExchange {
                        code,
                        redirect_uri: form.redirect_uri.as_deref(),
                        code_verifier: form.code_verifier.as_deref(),
                    },
                )
                .await
        }
        "refresh_token" => {
            let refresh_token = form
                .refresh_token
                .as_deref()
                .ok_or_else(|| OAuthError::invalid_request("Missing refresh_token"))?;
            issuer.refresh(&client, refresh_token).await
        }
        other => Err(OAuthError::unsupported_grant_type(other)),
    }
}

/// Fetch the client and verify its credentials.
///
/// Public clients skip the secret check; confidential clients must present
/// a secret whose SHA-256 matches the stored hash.
async fn authenticate_client(
    kv: Arc<dyn KvStore>,
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> OAuthResult<ClientInfo> {
    let client_id =
        client_id.ok_or_else(|| OAuthError::invalid_client("No client credentials provided"))?;

    let client = ClientRegistry::new(kv)
        .get(client_id)
        .await?
        .ok_or_else(|| OAuthError::invalid_client("Unknown client"))?;

    if client.is_public() {
        return Ok(client);
    }

    let secret = client_secret
        .ok_or_else(|| OAuthError::invalid_client("Client secret is required"))?;
    if !ClientRegistry::secret_matches(&client, secret) {
        return Err(OAuthError::invalid_client("Invalid client secret"));
    }

    Ok(client)
}

/// Parse an `Authorization: Basic …` header into client credentials.
fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    // Split on the first colon; the secret may contain colons.
    let (client_id, client_secret) = credentials.split_once(':')?;
    Some((client_id.to_string(), client_secret.to_string()))
}

/// Successful token responses must never be cached.
fn token_success_response(response: &TokenResponse) -> Response {
    let mut http_response = json_response(StatusCode::OK, response);
    let headers = http_response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    http_response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OAuthProviderOptions, ProviderConfig};
    use crate::handler::{RequestContext, RequestHandler};
    use crate::kv::MemoryKv;
    use crate::registry::ClientRegistration;
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::IntoResponse;

    fn test_config() -> ProviderConfig {
        async fn noop(_request: HandlerRequest, _ctx: RequestContext) -> Response {
            StatusCode::NOT_FOUND.into_response()
        }
        let options = OAuthProviderOptions::new(
            RequestHandler::from_fn(noop),
            RequestHandler::from_fn(noop),
        )
        .with_api_route("/api/");
        ProviderConfig::from_options(&options).unwrap()
    }

    fn form_request(method: Method, content_type: &str, body: &str) -> HandlerRequest {
        Request::builder()
            .method(method)
            .uri("https://auth.example.com/oauth/token")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_parse_basic_auth_valid() {
        let encoded = STANDARD.encode("client_id:client_secret");
        let parsed = parse_basic_auth(&format!("Basic {encoded}")).unwrap();
        assert_eq!(parsed.0, "client_id");
        assert_eq!(parsed.1, "client_secret");
    }

    #[test]
    fn test_parse_basic_auth_colon_in_secret() {
        let encoded = STANDARD.encode("client:pass:word");
        let parsed = parse_basic_auth(&format!("Basic {encoded}")).unwrap();
        assert_eq!(parsed.0, "client");
        assert_eq!(parsed.1, "pass:word");
    }

    #[test]
    fn test_parse_basic_auth_rejects_garbage() {
        assert!(parse_basic_auth("Bearer token").is_none());
        assert!(parse_basic_auth("Basic !!!not-base64!!!").is_none());
        let encoded = STANDARD.encode("nocolon");
        assert!(parse_basic_auth(&format!("Basic {encoded}")).is_none());
    }

    #[tokio::test]
    async fn test_rejects_wrong_method() {
        let config = test_config();
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let request = form_request(
            Method::GET,
            "application/x-www-form-urlencoded",
            "grant_type=authorization_code",
        );

        let response = handle(&config, kv, request).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_rejects_wrong_content_type() {
        let config = test_config();
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let request = form_request(Method::POST, "application/json", "{}");

        let response = handle(&config, kv, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_client_is_401() {
        let config = test_config();
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let request = form_request(
            Method::POST,
            "application/x-www-form-urlencoded",
            "grant_type=authorization_code&client_id=nope&code=x:y:z",
        );

        let response = handle(&config, kv, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_401() {
        let config = test_config();
        let kv = Arc::new(MemoryKv::new());
        let registry = ClientRegistry::new(kv.clone());
        let created = registry
            .create(ClientRegistration {
                redirect_uris: vec!["https://rp.example/cb".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        let body = format!(
            "grant_type=refresh_token&refresh_token=u:g:s&client_id={}&client_secret=wrong",
            created.client.client_id
        );
        let request = form_request(Method::POST, "application/x-www-form-urlencoded", &body);

        let response = handle(&config, kv, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unsupported_grant_type() {
        let config = test_config();
        let kv = Arc::new(MemoryKv::new());
        let registry = ClientRegistry::new(kv.clone());
        let created = registry
            .create(ClientRegistration {
                redirect_uris: vec!["https://rp.example/cb".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        let body = format!(
            "grant_type=client_credentials&client_id={}&client_secret={}",
            created.client.client_id,
            created.client_secret.unwrap()
        );
        let request = form_request(Method::POST, "application/x-www-form-urlencoded", &body);

        let response = handle(&config, kv, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
