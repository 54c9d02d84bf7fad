//! CORS handling for first-party responses.
//!
//! Whenever a request carries an `Origin` header, that origin is echoed
//! into `Access-Control-Allow-Origin` on the response. Responses from the
//! default handler are the application's own and are left untouched.

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Copy CORS headers onto a first-party response.
pub(crate) fn apply(mut response: Response, origin: Option<&HeaderValue>) -> Response {
    if let Some(origin) = origin {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Authorization, *"),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static("86400"),
        );
    }
    response
}

/// The 204 preflight response for `OPTIONS` against a first-party
/// endpoint.
pub(crate) fn preflight(origin: Option<&HeaderValue>) -> Response {
    let response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::NO_CONTENT.into_response());
    apply(response, origin)
}
