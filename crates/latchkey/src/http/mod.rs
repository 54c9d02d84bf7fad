//! HTTP handlers for the provider's first-party endpoints.

pub(crate) mod api_gate;
pub(crate) mod cors;
pub mod metadata;
pub(crate) mod register;
pub(crate) mod token;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use url::Url;

use crate::OAuthResult;
use crate::error::OAuthError;

/// Build the standard `{error, error_description}` response for a
/// library-originated error. `invalid_token` additionally carries the
/// `WWW-Authenticate` bearer challenge.
pub(crate) fn oauth_error_response(error: &OAuthError) -> Response {
    let body = serde_json::json!({
        "error": error.error_code(),
        "error_description": error.error_description(),
    });

    let mut builder = Response::builder()
        .status(error.http_status())
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, "no-store")
        .header(header::PRAGMA, "no-cache");

    if matches!(error, OAuthError::InvalidToken { .. }) {
        let description = error.error_description().replace('"', "'");
        builder = builder.header(
            header::WWW_AUTHENTICATE,
            format!(r#"Bearer realm="OAuth", error="invalid_token", error_description="{description}""#),
        );
    }

    builder
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Serialize a body as a JSON response with the given status.
pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_string(body) {
        Ok(json) => Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// The origin of the incoming request, from the request target when it is
/// absolute, else from the `Host` header (assumed https).
pub(crate) fn request_origin(uri: &Uri, headers: &HeaderMap) -> OAuthResult<Url> {
    if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
        return Url::parse(&format!("{scheme}://{authority}"))
            .map_err(|e| OAuthError::invalid_request(format!("Invalid request origin: {e}")));
    }

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| OAuthError::invalid_request("Missing Host header"))?;
    Url::parse(&format!("https://{host}"))
        .map_err(|e| OAuthError::invalid_request(format!("Invalid Host header: {e}")))
}

/// The host of the incoming request, used for API-route matching.
pub(crate) fn request_host<'a>(uri: &'a Uri, headers: &'a HeaderMap) -> Option<&'a str> {
    uri.authority().map(|authority| authority.as_str()).or_else(|| {
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let response = oauth_error_response(&OAuthError::invalid_grant("Invalid refresh token"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_invalid_token_carries_bearer_challenge() {
        let response = oauth_error_response(&OAuthError::invalid_token("Token expired"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.starts_with(r#"Bearer realm="OAuth""#));
        assert!(challenge.contains(r#"error="invalid_token""#));
        assert!(challenge.contains("Token expired"));
    }

    #[test]
    fn test_request_origin_from_absolute_uri() {
        let uri: Uri = "https://auth.example.com:8443/oauth/token".parse().unwrap();
        let origin = request_origin(&uri, &HeaderMap::new()).unwrap();
        assert_eq!(origin.as_str(), "https://auth.example.com:8443/");
    }

    #[test]
    fn test_request_origin_from_host_header() {
        let uri: Uri = "/oauth/token".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "auth.example.com".parse().unwrap());

        let origin = request_origin(&uri, &headers).unwrap();
        assert_eq!(origin.as_str(), "https://auth.example.com/");

        assert!(request_origin(&uri, &HeaderMap::new()).is_err());
    }
}
