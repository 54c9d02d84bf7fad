//! Dynamic client registration (RFC 7591).
//!
//! The request body is validated field by field against the metadata
//! schema; anything with the wrong JSON type is `invalid_client_metadata`.
//! Confidential clients receive their generated secret once, in the 201
//! response.

use std::sync::Arc;

use axum::body::to_bytes;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::config::ProviderConfig;
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::handler::HandlerRequest;
use crate::http::{json_response, oauth_error_response, request_origin};
use crate::kv::KvStore;
use crate::registry::{ClientRegistration, ClientRegistry};
use crate::types::TokenEndpointAuthMethod;

/// Maximum accepted registration body (1 MiB).
const MAX_REGISTRATION_BODY_BYTES: usize = 1024 * 1024;

/// Handle one registration request.
pub(crate) async fn handle(
    config: &ProviderConfig,
    kv: Arc<dyn KvStore>,
    request: HandlerRequest,
) -> Response {
    match process(config, kv, request).await {
        Ok(body) => json_response(StatusCode::CREATED, &body),
        Err(error) => {
            warn!(error = %error, "Client registration failed");
            oauth_error_response(&error)
        }
    }
}

async fn process(
    config: &ProviderConfig,
    kv: Arc<dyn KvStore>,
    request: HandlerRequest,
) -> OAuthResult<Value> {
    // Defense in depth: the router only routes here when configured, but
    // the handler is callable directly.
    let registration_endpoint = config
        .registration_endpoint
        .as_ref()
        .ok_or_else(|| OAuthError::not_implemented("Client registration is not enabled"))?;

    if request.method() != Method::POST {
        return Err(OAuthError::invalid_request_with_status(
            "Registration endpoint requires POST",
            405,
        ));
    }

    let (parts, body) = request.into_parts();

    if let Some(length) = parts
        .headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        && length > MAX_REGISTRATION_BODY_BYTES
    {
        return Err(OAuthError::invalid_request_with_status(
            "Request body too large",
            413,
        ));
    }

    let bytes = to_bytes(body, MAX_REGISTRATION_BODY_BYTES)
        .await
        .map_err(|_| OAuthError::invalid_request_with_status("Request body too large", 413))?;
    // Content-Length can lie; re-check what was actually read.
    if bytes.len() > MAX_REGISTRATION_BODY_BYTES {
        return Err(OAuthError::invalid_request_with_status(
            "Request body too large",
            413,
        ));
    }

    let metadata: Value = serde_json::from_slice(&bytes)
        .map_err(|e| OAuthError::invalid_request(format!("Request body is not valid JSON: {e}")))?;
    let metadata = metadata.as_object().ok_or_else(|| {
        OAuthError::invalid_client_metadata("Registration metadata must be a JSON object")
    })?;

    let redirect_uris = take_string_array(metadata, "redirect_uris")?
        .filter(|uris| !uris.is_empty())
        .ok_or_else(|| {
            OAuthError::invalid_client_metadata("At least one redirect URI is required")
        })?;

    let token_endpoint_auth_method = match take_string(metadata, "token_endpoint_auth_method")? {
        Some(raw) => TokenEndpointAuthMethod::parse(&raw).ok_or_else(|| {
            OAuthError::invalid_client_metadata(format!(
                "Unsupported token_endpoint_auth_method: {raw}"
            ))
        })?,
        None => TokenEndpointAuthMethod::ClientSecretBasic,
    };
    if token_endpoint_auth_method == TokenEndpointAuthMethod::None
        && config.disallow_public_client_registration
    {
        return Err(OAuthError::invalid_client_metadata(
            "Public client registration is not allowed",
        ));
    }

    let registration = ClientRegistration {
        redirect_uris,
        token_endpoint_auth_method,
        grant_types: take_string_array(metadata, "grant_types")?.unwrap_or_default(),
        response_types: take_string_array(metadata, "response_types")?.unwrap_or_default(),
        client_name: take_string(metadata, "client_name")?,
        logo_uri: take_string(metadata, "logo_uri")?,
        client_uri: take_string(metadata, "client_uri")?,
        policy_uri: take_string(metadata, "policy_uri")?,
        tos_uri: take_string(metadata, "tos_uri")?,
        jwks_uri: take_string(metadata, "jwks_uri")?,
        contacts: take_string_array(metadata, "contacts")?,
    };

    let created = ClientRegistry::new(kv).create(registration).await?;
    let client = &created.client;

    let origin = request_origin(&parts.uri, &parts.headers)?;
    let endpoint_url = registration_endpoint.resolve(&origin)?;
    let registration_client_uri = format!("{endpoint_url}/{}", client.client_id);

    info!(client_id = %client.client_id, "Client registered dynamically");

    let mut body = Map::new();
    body.insert("client_id".to_string(), json!(client.client_id));
    if let Some(secret) = &created.client_secret {
        body.insert("client_secret".to_string(), json!(secret));
    }
    body.insert("redirect_uris".to_string(), json!(client.redirect_uris));
    body.insert(
        "token_endpoint_auth_method".to_string(),
        json!(client.token_endpoint_auth_method.as_str()),
    );
    body.insert("grant_types".to_string(), json!(client.grant_types));
    body.insert("response_types".to_string(), json!(client.response_types));
    for (field, value) in [
        ("client_name", &client.client_name),
        ("logo_uri", &client.logo_uri),
        ("client_uri", &client.client_uri),
        ("policy_uri", &client.policy_uri),
        ("tos_uri", &client.tos_uri),
        ("jwks_uri", &client.jwks_uri),
    ] {
        if let Some(value) = value {
            body.insert(field.to_string(), json!(value));
        }
    }
    if let Some(contacts) = &client.contacts {
        body.insert("contacts".to_string(), json!(contacts));
    }
    body.insert(
        "client_id_issued_at".to_string(),
        json!(client.registration_date),
    );
    body.insert(
        "registration_client_uri".to_string(),
        json!(registration_client_uri),
    );

    Ok(Value::Object(body))
}

/// A string-typed metadata field: a string, or absent. Anything else is a
/// metadata error.
fn take_string(metadata: &Map<String, Value>, field: &str) -> OAuthResult<Option<String>> {
    match metadata.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(OAuthError::invalid_client_metadata(format!(
            "{field} must be a string"
        ))),
    }
}

/// A string-array metadata field: an array of strings, or absent.
fn take_string_array(
    metadata: &Map<String, Value>,
    field: &str,
) -> OAuthResult<Option<Vec<String>>> {
    match metadata.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(String::from).ok_or_else(|| {
                    OAuthError::invalid_client_metadata(format!(
                        "{field} must be an array of strings"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(OAuthError::invalid_client_metadata(format!(
            "{field} must be an array of strings"
        ))),
    }
}
