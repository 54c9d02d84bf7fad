//! Access-token issuance and the token-grant state machines.
//!
//! Write ordering is security-critical and not transactional: the mutated
//! grant (auth-code slot cleared, refresh slots rotated) is persisted
//! *before* the access-token record. If the token write then fails, a
//! retrying client sees `invalid_grant` rather than a double issuance.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::crypto::{self, KEY_SIZE};
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::kv::KvStore;
use crate::pkce::{self, CodeChallengeMethod};
use crate::schema;
use crate::token::format::{ParsedToken, mint_token_string, token_hash};
use crate::types::{AccessTokenRecord, ClientInfo, Grant, GrantSnapshot};

/// Successful token response body (RFC 6749 section 5.1).
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    /// The access token string.
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Refresh token, absent for the implicit flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scope, space separated.
    pub scope: String,
}

/// An access token minted by [`TokenIssuer::issue_access_token`].
#[derive(Debug, Clone)]
pub struct MintedAccessToken {
    /// The full token string.
    pub token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Parameters of an `authorization_code` exchange.
#[derive(Debug, Clone, Copy)]
pub struct CodeExchange<'a> {
    /// The authorization code presented by the client.
    pub code: &'a str,
    /// The redirect URI, required when PKCE was not used at authorization.
    pub redirect_uri: Option<&'a str>,
    /// The PKCE verifier, required when PKCE was used.
    pub code_verifier: Option<&'a str>,
}

/// Mints tokens and drives the code-redemption and refresh-rotation state
/// machines over the store.
#[derive(Clone)]
pub struct TokenIssuer {
    kv: Arc<dyn KvStore>,
    access_token_ttl: u64,
}

impl TokenIssuer {
    /// Creates an issuer with the given access-token lifetime in seconds.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, access_token_ttl: u64) -> Self {
        Self {
            kv,
            access_token_ttl,
        }
    }

    /// Mint an access token for a grant and persist its record with a
    /// storage TTL matching `expires_at`.
    ///
    /// The record denormalizes the grant's client, scope and encrypted
    /// props so API validation is a single read, and carries the props key
    /// wrapped under the new token string.
    ///
    /// # Errors
    ///
    /// Returns a crypto or storage error.
    pub async fn issue_access_token(
        &self,
        grant: &Grant,
        props_key: &[u8; KEY_SIZE],
    ) -> OAuthResult<MintedAccessToken> {
        let token = mint_token_string(&grant.user_id, &grant.id);
        let hash = token_hash(&token);
        let wrapped_encryption_key = crypto::wrap_props_key(&token, props_key)?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let record = AccessTokenRecord {
            id: hash.clone(),
            grant_id: grant.id.clone(),
            user_id: grant.user_id.clone(),
            created_at: now,
            expires_at: now + self.access_token_ttl as i64,
            wrapped_encryption_key,
            grant: GrantSnapshot {
                client_id: grant.client_id.clone(),
                scope: grant.scope.clone(),
                encrypted_props: grant.encrypted_props.clone(),
            },
        };

        schema::put_json(
            self.kv.as_ref(),
            &schema::token_key(&grant.user_id, &grant.id, &hash),
            &record,
            Some(self.access_token_ttl),
        )
        .await?;

        debug!(grant_id = %grant.id, "Access token minted");

        Ok(MintedAccessToken {
            token,
            expires_in: self.access_token_ttl,
        })
    }

    /// Redeem an authorization code: the `authorization_code` grant type.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` for a malformed, unknown, replayed or
    /// mismatched code, a redirect-URI mismatch, or a PKCE failure;
    /// `invalid_request` for missing conditional parameters.
    pub async fn exchange_authorization_code(
        &self,
        client: &ClientInfo,
        exchange: CodeExchange<'_>,
    ) -> OAuthResult<TokenResponse> {
        let parsed = ParsedToken::parse(exchange.code)
            .map_err(|_| OAuthError::invalid_grant("Malformed authorization code"))?;

        let grant_key = schema::grant_key(&parsed.user_id, &parsed.grant_id);
        let mut grant: Grant = schema::get_json(self.kv.as_ref(), &grant_key)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("Grant not found or expired"))?;

        // Anti-replay gate: the slot is cleared on first redemption.
        let auth_code_id = grant
            .auth_code_id
            .clone()
            .ok_or_else(|| OAuthError::invalid_grant("Authorization code already used"))?;

        if token_hash(exchange.code) != auth_code_id {
            return Err(OAuthError::invalid_grant("Invalid authorization code"));
        }
        if grant.client_id != client.client_id {
            return Err(OAuthError::invalid_grant(
                "Authorization code was issued to another client",
            ));
        }

        if grant.code_challenge.is_none() && exchange.redirect_uri.is_none() {
            return Err(OAuthError::invalid_request("redirect_uri is required"));
        }
        if let Some(redirect_uri) = exchange.redirect_uri
            && !client.redirect_uri_registered(redirect_uri)
        {
            return Err(OAuthError::invalid_grant("Redirect URI mismatch"));
        }

        if let Some(challenge) = &grant.code_challenge {
            let verifier = exchange
                .code_verifier
                .ok_or_else(|| OAuthError::invalid_request("code_verifier is required"))?;
            let method = match grant.code_challenge_method.as_deref() {
                Some(raw) => CodeChallengeMethod::parse(raw)
                    .ok_or_else(|| OAuthError::invalid_grant("Unknown code challenge method"))?,
                None => CodeChallengeMethod::default(),
            };
            if !pkce::verify(method, challenge, verifier) {
                return Err(OAuthError::invalid_grant("PKCE verification failed"));
            }
        }

        let wrapped = grant
            .auth_code_wrapped_key
            .clone()
            .ok_or_else(|| OAuthError::crypto("Grant is missing the auth code wrapped key"))?;
        let props_key = crypto::unwrap_props_key(exchange.code, &wrapped)?;

        let refresh_token = mint_token_string(&grant.user_id, &grant.id);
        let refresh_wrapped = crypto::wrap_props_key(&refresh_token, &props_key)?;

        // Single-use transition: clear the code slot, install the first
        // refresh slot, drop the TTL the pending grant carried. Persisted
        // before the access-token record (see module docs).
        grant.auth_code_id = None;
        grant.auth_code_wrapped_key = None;
        grant.code_challenge = None;
        grant.code_challenge_method = None;
        grant.refresh_token_id = Some(token_hash(&refresh_token));
        grant.refresh_token_wrapped_key = Some(refresh_wrapped);
        grant.previous_refresh_token_id = None;
        grant.previous_refresh_token_wrapped_key = None;
        schema::put_json(self.kv.as_ref(), &grant_key, &grant, None).await?;

        let minted = self.issue_access_token(&grant, &props_key).await?;

        info!(
            client_id = %client.client_id,
            grant_id = %grant.id,
            "Authorization code redeemed"
        );

        Ok(TokenResponse {
            access_token: minted.token,
            token_type: "bearer".to_string(),
            expires_in: minted.expires_in,
            refresh_token: Some(refresh_token),
            scope: grant.scope.join(" "),
        })
    }

    /// Rotate a refresh token: the `refresh_token` grant type.
    ///
    /// Both the current and the previous refresh token are accepted. The
    /// rotation is unconditional: the presented token becomes the previous
    /// slot and a new current is minted, so a client that retries the same
    /// refresh succeeds exactly twice in sequence while the token before
    /// last becomes invalid.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` for a malformed, unknown or mismatched
    /// token.
    pub async fn refresh(
        &self,
        client: &ClientInfo,
        refresh_token: &str,
    ) -> OAuthResult<TokenResponse> {
        let parsed = ParsedToken::parse(refresh_token)
            .map_err(|_| OAuthError::invalid_grant("Malformed refresh token"))?;

        let grant_key = schema::grant_key(&parsed.user_id, &parsed.grant_id);
        let mut grant: Grant = schema::get_json(self.kv.as_ref(), &grant_key)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("Grant not found"))?;

        let presented_hash = token_hash(refresh_token);
        let matched_wrapped = if grant.refresh_token_id.as_deref() == Some(&presented_hash) {
            grant.refresh_token_wrapped_key.clone()
        } else if grant.previous_refresh_token_id.as_deref() == Some(&presented_hash) {
            grant.previous_refresh_token_wrapped_key.clone()
        } else {
            return Err(OAuthError::invalid_grant("Invalid refresh token"));
        };
        let matched_wrapped = matched_wrapped
            .ok_or_else(|| OAuthError::crypto("Grant is missing the refresh wrapped key"))?;

        if grant.client_id != client.client_id {
            return Err(OAuthError::invalid_grant(
                "Refresh token was issued to another client",
            ));
        }

        let props_key = crypto::unwrap_props_key(refresh_token, &matched_wrapped)?;

        let new_refresh = mint_token_string(&grant.user_id, &grant.id);
        let new_wrapped = crypto::wrap_props_key(&new_refresh, &props_key)?;

        grant.previous_refresh_token_id = Some(presented_hash);
        grant.previous_refresh_token_wrapped_key = Some(matched_wrapped);
        grant.refresh_token_id = Some(token_hash(&new_refresh));
        grant.refresh_token_wrapped_key = Some(new_wrapped);
        schema::put_json(self.kv.as_ref(), &grant_key, &grant, None).await?;

        let minted = self.issue_access_token(&grant, &props_key).await?;

        info!(
            client_id = %client.client_id,
            grant_id = %grant.id,
            "Refresh token rotated"
        );

        Ok(TokenResponse {
            access_token: minted.token,
            token_type: "bearer".to_string(),
            expires_in: minted.expires_in,
            refresh_token: Some(new_refresh),
            scope: grant.scope.join(" "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TOKEN_SECRET_LENGTH;
    use crate::kv::MemoryKv;
    use crate::schema::AUTH_CODE_TTL_SECS;
    use crate::types::TokenEndpointAuthMethod;
    use serde_json::json;

    const USER: &str = "u1";
    const GRANT: &str = "grantid123456789";

    fn test_client() -> ClientInfo {
        ClientInfo {
            client_id: "clientid12345678".to_string(),
            client_secret: None,
            redirect_uris: vec!["https://rp.example/cb".to_string()],
            token_endpoint_auth_method: TokenEndpointAuthMethod::None,
            grant_types: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            response_types: vec!["code".to_string()],
            client_name: None,
            logo_uri: None,
            client_uri: None,
            policy_uri: None,
            tos_uri: None,
            jwks_uri: None,
            contacts: None,
            registration_date: None,
        }
    }

    /// Build a pending grant the way authorization completion would,
    /// returning the store, the issuer and the authorization code.
    async fn pending_grant(
        challenge: Option<(&str, &str)>,
    ) -> (Arc<MemoryKv>, TokenIssuer, String) {
        let kv = Arc::new(MemoryKv::new());
        let props_key = crypto::generate_props_key();
        let code = format!("{USER}:{GRANT}:{}", crypto::random_string(TOKEN_SECRET_LENGTH));

        let grant = Grant {
            id: GRANT.to_string(),
            client_id: test_client().client_id,
            user_id: USER.to_string(),
            scope: vec!["read".to_string()],
            metadata: json!({}),
            encrypted_props: crypto::encrypt_props(&props_key, &json!({"sub": USER})).unwrap(),
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
            auth_code_id: Some(token_hash(&code)),
            auth_code_wrapped_key: Some(crypto::wrap_props_key(&code, &props_key).unwrap()),
            code_challenge: challenge.map(|(c, _)| c.to_string()),
            code_challenge_method: challenge.map(|(_, m)| m.to_string()),
            refresh_token_id: None,
            refresh_token_wrapped_key: None,
            previous_refresh_token_id: None,
            previous_refresh_token_wrapped_key: None,
        };
        schema::put_json(
            kv.as_ref(),
            &schema::grant_key(USER, GRANT),
            &grant,
            Some(AUTH_CODE_TTL_SECS),
        )
        .await
        .unwrap();

        let issuer = TokenIssuer::new(kv.clone(), 3600);
        (kv, issuer, code)
    }

    fn plain_exchange(code: &str) -> CodeExchange<'_> {
        CodeExchange {
            code,
            redirect_uri: Some("https://rp.example/cb"),
            code_verifier: None,
        }
    }

    #[tokio::test]
    async fn test_code_exchange_happy_path() {
        let (kv, issuer, code) = pending_grant(None).await;
        let client = test_client();

        let response = issuer
            .exchange_authorization_code(&client, plain_exchange(&code))
            .await
            .unwrap();

        assert_eq!(response.token_type, "bearer");
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.scope, "read");
        assert!(response.refresh_token.is_some());

        // The grant lost its code slot and gained a refresh slot.
        let grant: Grant = schema::get_json(kv.as_ref(), &schema::grant_key(USER, GRANT))
            .await
            .unwrap()
            .unwrap();
        assert!(!grant.has_auth_code());
        assert!(grant.code_challenge.is_none());
        assert!(grant.refresh_token_id.is_some());
        assert!(grant.previous_refresh_token_id.is_none());

        // The access-token record exists under the token's hash.
        let hash = token_hash(&response.access_token);
        let record: Option<AccessTokenRecord> =
            schema::get_json(kv.as_ref(), &schema::token_key(USER, GRANT, &hash))
                .await
                .unwrap();
        assert!(record.is_some());
    }

    #[tokio::test]
    async fn test_code_replay_rejected() {
        let (_kv, issuer, code) = pending_grant(None).await;
        let client = test_client();

        issuer
            .exchange_authorization_code(&client, plain_exchange(&code))
            .await
            .unwrap();

        let err = issuer
            .exchange_authorization_code(&client, plain_exchange(&code))
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant { .. }));
        assert!(err.error_description().contains("already used"));
    }

    #[tokio::test]
    async fn test_wrong_code_secret_rejected() {
        let (_kv, issuer, _code) = pending_grant(None).await;
        let forged = format!("{USER}:{GRANT}:{}", crypto::random_string(32));

        let err = issuer
            .exchange_authorization_code(&test_client(), plain_exchange(&forged))
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_client_mismatch_rejected() {
        let (_kv, issuer, code) = pending_grant(None).await;
        let mut other = test_client();
        other.client_id = "otherclient12345".to_string();

        let err = issuer
            .exchange_authorization_code(&other, plain_exchange(&code))
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_redirect_uri_must_match_whole_string() {
        let (_kv, issuer, code) = pending_grant(None).await;

        let err = issuer
            .exchange_authorization_code(
                &test_client(),
                CodeExchange {
                    code: &code,
                    redirect_uri: Some("https://rp.example/cb/extra"),
                    code_verifier: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_redirect_uri_required_without_pkce() {
        let (_kv, issuer, code) = pending_grant(None).await;

        let err = issuer
            .exchange_authorization_code(
                &test_client(),
                CodeExchange {
                    code: &code,
                    redirect_uri: None,
                    code_verifier: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_pkce_s256_verification() {
        let challenge = pkce::s256_challenge("verifier123");
        let (_kv, issuer, code) = pending_grant(Some((&challenge, "S256"))).await;
        let client = test_client();

        // Wrong verifier fails.
        let err = issuer
            .exchange_authorization_code(
                &client,
                CodeExchange {
                    code: &code,
                    redirect_uri: None,
                    code_verifier: Some("wrong"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant { .. }));

        // Correct verifier succeeds, without a redirect_uri.
        let response = issuer
            .exchange_authorization_code(
                &client,
                CodeExchange {
                    code: &code,
                    redirect_uri: None,
                    code_verifier: Some("verifier123"),
                },
            )
            .await
            .unwrap();
        assert!(response.refresh_token.is_some());
    }

    #[tokio::test]
    async fn test_pkce_verifier_required() {
        let challenge = pkce::s256_challenge("verifier123");
        let (_kv, issuer, code) = pending_grant(Some((&challenge, "S256"))).await;

        let err = issuer
            .exchange_authorization_code(
                &test_client(),
                CodeExchange {
                    code: &code,
                    redirect_uri: None,
                    code_verifier: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_refresh_rotation_grace_window() {
        let (_kv, issuer, code) = pending_grant(None).await;
        let client = test_client();

        let initial = issuer
            .exchange_authorization_code(&client, plain_exchange(&code))
            .await
            .unwrap();
        let r0 = initial.refresh_token.unwrap();

        // r0 -> r1
        let r1 = issuer
            .refresh(&client, &r0)
            .await
            .unwrap()
            .refresh_token
            .unwrap();
        // r1 -> r2
        let r2 = issuer
            .refresh(&client, &r1)
            .await
            .unwrap()
            .refresh_token
            .unwrap();
        assert_ne!(r1, r2);

        // r1 is now "previous" and still works once more.
        let r3 = issuer
            .refresh(&client, &r1)
            .await
            .unwrap()
            .refresh_token
            .unwrap();
        assert_ne!(r3, r2);

        // r0 fell out of the two-slot window.
        let err = issuer.refresh(&client, &r0).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_refresh_wrong_client_rejected() {
        let (_kv, issuer, code) = pending_grant(None).await;
        let client = test_client();

        let r0 = issuer
            .exchange_authorization_code(&client, plain_exchange(&code))
            .await
            .unwrap()
            .refresh_token
            .unwrap();

        let mut other = test_client();
        other.client_id = "otherclient12345".to_string();
        let err = issuer.refresh(&other, &r0).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant { .. }));
    }

    #[tokio::test]
    async fn test_refresh_unknown_token_rejected() {
        let (_kv, issuer, code) = pending_grant(None).await;
        let client = test_client();
        issuer
            .exchange_authorization_code(&client, plain_exchange(&code))
            .await
            .unwrap();

        let forged = format!("{USER}:{GRANT}:{}", crypto::random_string(32));
        let err = issuer.refresh(&client, &forged).await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant { .. }));

        let err = issuer.refresh(&client, "garbage").await.unwrap_err();
        assert!(matches!(err, OAuthError::InvalidGrant { .. }));
    }
}
