//! The API gate: bearer validation in front of the application's resource
//! handler.
//!
//! Validation is a single store read thanks to the grant snapshot on the
//! token record. The presented token string unwraps the props key, the
//! props decrypt, and the plaintext is attached to the request context for
//! the API handler.

use std::sync::Arc;

use axum::http::header;
use axum::response::Response;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::authorize::OAuthHelpers;
use crate::crypto;
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::handler::{HandlerRequest, RequestContext, RequestHandler};
use crate::http::oauth_error_response;
use crate::kv::KvStore;
use crate::schema;
use crate::token::format::{ParsedToken, token_hash};
use crate::types::AccessTokenRecord;

/// Validate the bearer token and hand the request to the API handler.
pub(crate) async fn handle(
    kv: Arc<dyn KvStore>,
    helpers: &OAuthHelpers,
    api_handler: &RequestHandler,
    request: HandlerRequest,
) -> Response {
    match validate(kv.as_ref(), &request).await {
        Ok(props) => {
            let ctx = RequestContext::new(helpers.clone(), Some(props));
            api_handler.invoke(request, ctx).await
        }
        Err(error) => {
            warn!(error = %error, "API request rejected");
            oauth_error_response(&error)
        }
    }
}

async fn validate(
    kv: &dyn KvStore,
    request: &HandlerRequest,
) -> OAuthResult<serde_json::Value> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| OAuthError::invalid_token("Missing Authorization header"))?;
    let token = authorization
        .strip_prefix("Bearer ")
        .ok_or_else(|| OAuthError::invalid_token("Authorization header must use the Bearer scheme"))?;

    let parsed = ParsedToken::parse(token)
        .map_err(|_| OAuthError::invalid_token("Malformed access token"))?;

    let record: AccessTokenRecord = schema::get_json(
        kv,
        &schema::token_key(&parsed.user_id, &parsed.grant_id, &token_hash(token)),
    )
    .await?
    .ok_or_else(|| OAuthError::invalid_token("Token not found or expired"))?;

    // The storage TTL normally removes expired records; re-check in case
    // the store serves past it.
    if record.is_expired(OffsetDateTime::now_utc().unix_timestamp()) {
        return Err(OAuthError::invalid_token("Token expired"));
    }

    let props_key = crypto::unwrap_props_key(token, &record.wrapped_encryption_key)?;
    let props = crypto::decrypt_props(&props_key, &record.grant.encrypted_props)?;

    debug!(grant_id = %record.grant_id, "Bearer token validated");
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use crate::types::GrantSnapshot;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;

    fn bearer_request(token: &str) -> HandlerRequest {
        Request::builder()
            .uri("https://api.example.com/api/things")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn live_token(kv: &MemoryKv, expires_in: i64) -> String {
        let token = "u1:grantid123456789:secretsecretsecretsecretsecret12".to_string();
        let props_key = crypto::generate_props_key();
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let record = AccessTokenRecord {
            id: token_hash(&token),
            grant_id: "grantid123456789".to_string(),
            user_id: "u1".to_string(),
            created_at: now,
            expires_at: now + expires_in,
            wrapped_encryption_key: crypto::wrap_props_key(&token, &props_key).unwrap(),
            grant: GrantSnapshot {
                client_id: "clientid12345678".to_string(),
                scope: vec!["read".to_string()],
                encrypted_props: crypto::encrypt_props(&props_key, &json!({"sub": "u1"})).unwrap(),
            },
        };
        schema::put_json(
            kv,
            &schema::token_key("u1", "grantid123456789", &record.id),
            &record,
            None,
        )
        .await
        .unwrap();
        token
    }

    #[tokio::test]
    async fn test_validate_decrypts_props() {
        let kv = MemoryKv::new();
        let token = live_token(&kv, 3600).await;

        let props = validate(&kv, &bearer_request(&token)).await.unwrap();
        assert_eq!(props, json!({"sub": "u1"}));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_bearer() {
        let kv = MemoryKv::new();

        let request = Request::builder()
            .uri("https://api.example.com/api/things")
            .body(Body::empty())
            .unwrap();
        let err = validate(&kv, &request).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidToken { .. }));

        let request = Request::builder()
            .uri("https://api.example.com/api/things")
            .header(header::AUTHORIZATION, "Basic abc")
            .body(Body::empty())
            .unwrap();
        let err = validate(&kv, &request).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidToken { .. }));

        let err = validate(&kv, &bearer_request("not-a-token"))
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let kv = MemoryKv::new();
        let err = validate(&kv, &bearer_request("u1:g1:unknownsecret"))
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_expired_record_rejected() {
        let kv = MemoryKv::new();
        // Record still present but past expires_at: the defense-in-depth
        // check fires.
        let token = live_token(&kv, -10).await;

        let err = validate(&kv, &bearer_request(&token)).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidToken { .. }));
        assert!(err.error_description().contains("expired"));
    }

    #[tokio::test]
    async fn test_wrong_secret_fails_even_with_valid_ids() {
        let kv = MemoryKv::new();
        let _token = live_token(&kv, 3600).await;

        // Same user and grant ids, different secret: the lookup hash
        // misses.
        let forged = "u1:grantid123456789:differentsecretdifferentsecret12";
        let err = validate(&kv, &bearer_request(forged)).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_gate_returns_401_response() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let helpers = OAuthHelpers::new(kv.clone(), 3600, false);
        let handler = RequestHandler::from_fn(|_request, _ctx| async {
            use axum::response::IntoResponse;
            StatusCode::OK.into_response()
        });

        let response = handle(kv, &helpers, &handler, bearer_request("u1:g1:nope")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_some());
    }
}
