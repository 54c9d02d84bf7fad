//! Authorization helper surface, consumed by the default handler.
//!
//! The default handler owns the login/consent UI; once the user approves,
//! it calls [`OAuthHelpers::complete_authorization`] to create the grant
//! and obtain the redirect back to the client. The same surface exposes
//! grant listing/revocation and the client registry for management UIs.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info};
use url::Url;

use crate::crypto;
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::handler::HandlerRequest;
use crate::kv::{KvListOptions, KvStore};
use crate::pkce::CodeChallengeMethod;
use crate::registry::ClientRegistry;
use crate::schema::{self, AUTH_CODE_TTL_SECS};
use crate::token::format::{mint_token_string, token_hash};
use crate::token::service::TokenIssuer;
use crate::types::{Grant, GrantSummary, ListOptions};

/// Length of generated grant identifiers.
pub const GRANT_ID_LENGTH: usize = 16;

/// The response type of an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Authorization code flow.
    Code,
    /// Implicit flow; only parsed when enabled.
    Token,
}

/// A parsed authorization request.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// `code` or (when enabled) `token`.
    pub response_type: ResponseType,
    /// The requesting client.
    pub client_id: String,
    /// Where to send the user after authorization.
    pub redirect_uri: String,
    /// Requested scope, space-split with empty entries dropped.
    pub scope: Vec<String>,
    /// Opaque client state, echoed on the redirect.
    pub state: Option<String>,
    /// PKCE challenge, if the client sent one.
    pub code_challenge: Option<String>,
    /// PKCE challenge method; `plain` when the client named none.
    pub code_challenge_method: CodeChallengeMethod,
}

/// Input to [`OAuthHelpers::complete_authorization`].
#[derive(Debug, Clone)]
pub struct CompleteAuthorization {
    /// The parsed authorization request being completed.
    pub request: AuthRequest,
    /// The authenticated user granting access.
    pub user_id: String,
    /// Application metadata stored on the grant, visible to management
    /// APIs.
    pub metadata: serde_json::Value,
    /// The granted scope, possibly narrower than requested.
    pub scope: Vec<String>,
    /// Application props, encrypted at rest and delivered to API handlers
    /// on every authenticated request.
    pub props: serde_json::Value,
}

/// Result of completing an authorization.
#[derive(Debug, Clone)]
pub struct CompletedAuthorization {
    /// The URL to redirect the user agent to.
    pub redirect_to: String,
}

/// One page of a user's grants.
#[derive(Debug, Clone)]
pub struct GrantListPage {
    /// Grant summaries in this page.
    pub grants: Vec<GrantSummary>,
    /// Continuation cursor; `None` once the listing is complete.
    pub cursor: Option<String>,
}

struct HelpersInner {
    kv: Arc<dyn KvStore>,
    registry: ClientRegistry,
    issuer: TokenIssuer,
    allow_implicit_flow: bool,
}

/// The helper surface installed on every request context.
#[derive(Clone)]
pub struct OAuthHelpers {
    inner: Arc<HelpersInner>,
}

impl OAuthHelpers {
    pub(crate) fn new(
        kv: Arc<dyn KvStore>,
        access_token_ttl: u64,
        allow_implicit_flow: bool,
    ) -> Self {
        Self {
            inner: Arc::new(HelpersInner {
                registry: ClientRegistry::new(kv.clone()),
                issuer: TokenIssuer::new(kv.clone(), access_token_ttl),
                kv,
                allow_implicit_flow,
            }),
        }
    }

    /// The client registry.
    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.inner.registry
    }

    /// Parse the query parameters of an authorization request.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` for missing or unsupported parameters,
    /// including `response_type=token` while the implicit flow is
    /// disabled.
    pub fn parse_auth_request(&self, request: &HandlerRequest) -> OAuthResult<AuthRequest> {
        let query = request.uri().query().unwrap_or("");
        let mut params: HashMap<String, String> = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.entry(key.into_owned()).or_insert(value.into_owned());
        }

        let response_type = match params.get("response_type").map(String::as_str) {
            Some("code") => ResponseType::Code,
            Some("token") if self.inner.allow_implicit_flow => ResponseType::Token,
            Some("token") => {
                return Err(OAuthError::invalid_request(
                    "The implicit flow is not enabled",
                ));
            }
            Some(other) => {
                return Err(OAuthError::invalid_request(format!(
                    "Unsupported response_type: {other}"
                )));
            }
            None => return Err(OAuthError::invalid_request("Missing response_type")),
        };

        let client_id = params
            .get("client_id")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("Missing client_id"))?
            .clone();
        let redirect_uri = params
            .get("redirect_uri")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("Missing redirect_uri"))?
            .clone();

        let scope = params
            .get("scope")
            .map(|raw| raw.split(' ').filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        let state = params.get("state").filter(|v| !v.is_empty()).cloned();
        let code_challenge = params
            .get("code_challenge")
            .filter(|v| !v.is_empty())
            .cloned();
        let code_challenge_method = match params.get("code_challenge_method") {
            Some(raw) => CodeChallengeMethod::parse(raw).ok_or_else(|| {
                OAuthError::invalid_request(format!("Unsupported code_challenge_method: {raw}"))
            })?,
            None => CodeChallengeMethod::default(),
        };

        Ok(AuthRequest {
            response_type,
            client_id,
            redirect_uri,
            scope,
            state,
            code_challenge,
            code_challenge_method,
        })
    }

    /// Complete an approved authorization: create the grant, encrypt the
    /// props, and build the redirect back to the client.
    ///
    /// For the code flow the grant carries the auth-code slot and a
    /// 10-minute TTL; the code travels in the redirect query. For the
    /// implicit flow an access token is minted immediately and travels in
    /// the redirect fragment.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` for an unknown client, `invalid_request`
    /// for an unregistered redirect URI, or a crypto/storage error.
    pub async fn complete_authorization(
        &self,
        options: CompleteAuthorization,
    ) -> OAuthResult<CompletedAuthorization> {
        let request = &options.request;

        let client = self
            .inner
            .registry
            .get(&request.client_id)
            .await?
            .ok_or_else(|| OAuthError::invalid_client("Unknown client"))?;
        if !client.redirect_uri_registered(&request.redirect_uri) {
            return Err(OAuthError::invalid_request(
                "redirect_uri is not registered for this client",
            ));
        }

        let grant_id = crypto::random_string(GRANT_ID_LENGTH);
        let props_key = crypto::generate_props_key();
        let encrypted_props = crypto::encrypt_props(&props_key, &options.props)?;
        let created_at = OffsetDateTime::now_utc().unix_timestamp();

        let mut redirect = Url::parse(&request.redirect_uri)
            .map_err(|e| OAuthError::invalid_request(format!("Invalid redirect_uri: {e}")))?;

        let mut grant = Grant {
            id: grant_id.clone(),
            client_id: client.client_id.clone(),
            user_id: options.user_id.clone(),
            scope: options.scope,
            metadata: options.metadata,
            encrypted_props,
            created_at,
            auth_code_id: None,
            auth_code_wrapped_key: None,
            code_challenge: None,
            code_challenge_method: None,
            refresh_token_id: None,
            refresh_token_wrapped_key: None,
            previous_refresh_token_id: None,
            previous_refresh_token_wrapped_key: None,
        };
        let grant_key = schema::grant_key(&options.user_id, &grant_id);

        match request.response_type {
            ResponseType::Code => {
                let code = mint_token_string(&options.user_id, &grant_id);
                grant.auth_code_id = Some(token_hash(&code));
                grant.auth_code_wrapped_key = Some(crypto::wrap_props_key(&code, &props_key)?);
                grant.code_challenge = request.code_challenge.clone();
                grant.code_challenge_method = request
                    .code_challenge
                    .is_some()
                    .then(|| request.code_challenge_method.as_str().to_string());

                schema::put_json(
                    self.inner.kv.as_ref(),
                    &grant_key,
                    &grant,
                    Some(AUTH_CODE_TTL_SECS),
                )
                .await?;

                {
                    let mut pairs = redirect.query_pairs_mut();
                    pairs.append_pair("code", &code);
                    if let Some(state) = &request.state {
                        pairs.append_pair("state", state);
                    }
                }

                info!(
                    client_id = %client.client_id,
                    grant_id = %grant_id,
                    "Authorization completed (code flow)"
                );
            }
            ResponseType::Token => {
                if !self.inner.allow_implicit_flow {
                    return Err(OAuthError::invalid_request(
                        "The implicit flow is not enabled",
                    ));
                }

                schema::put_json(self.inner.kv.as_ref(), &grant_key, &grant, None).await?;
                let minted = self.inner.issuer.issue_access_token(&grant, &props_key).await?;

                let mut fragment = url::form_urlencoded::Serializer::new(String::new());
                fragment.append_pair("access_token", &minted.token);
                fragment.append_pair("token_type", "bearer");
                fragment.append_pair("expires_in", &minted.expires_in.to_string());
                fragment.append_pair("scope", &grant.scope.join(" "));
                if let Some(state) = &request.state {
                    fragment.append_pair("state", state);
                }
                redirect.set_fragment(Some(&fragment.finish()));

                info!(
                    client_id = %client.client_id,
                    grant_id = %grant_id,
                    "Authorization completed (implicit flow)"
                );
            }
        }

        Ok(CompletedAuthorization {
            redirect_to: redirect.to_string(),
        })
    }

    /// List a user's grants as management-facing summaries.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn list_user_grants(
        &self,
        user_id: &str,
        options: ListOptions,
    ) -> OAuthResult<GrantListPage> {
        let page = self
            .inner
            .kv
            .list(KvListOptions {
                prefix: schema::grant_prefix(user_id),
                limit: options.limit,
                cursor: options.cursor,
            })
            .await
            .map_err(|e| OAuthError::storage(e.to_string()))?;

        let mut grants = Vec::with_capacity(page.keys.len());
        for key in &page.keys {
            // A grant can expire between the list and the get; skip it.
            if let Some(grant) =
                schema::get_json::<Grant>(self.inner.kv.as_ref(), &key.name).await?
            {
                grants.push(grant.summary());
            }
        }

        Ok(GrantListPage {
            grants,
            cursor: page.cursor,
        })
    }

    /// Revoke a grant: delete every access token issued under it, then the
    /// grant itself. Revoking an unknown grant is a no-op.
    ///
    /// The token listing is drained to completion; tokens issued
    /// concurrently with the drain survive until their own TTL, which is
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub async fn revoke_grant(&self, grant_id: &str, user_id: &str) -> OAuthResult<()> {
        let prefix = schema::token_prefix(user_id, grant_id);
        let mut cursor = None;
        let mut deleted = 0usize;

        loop {
            let page = self
                .inner
                .kv
                .list(KvListOptions {
                    prefix: prefix.clone(),
                    limit: None,
                    cursor,
                })
                .await
                .map_err(|e| OAuthError::storage(e.to_string()))?;

            for key in &page.keys {
                schema::delete(self.inner.kv.as_ref(), &key.name).await?;
                deleted += 1;
            }

            if page.list_complete {
                break;
            }
            cursor = page.cursor;
        }

        schema::delete(
            self.inner.kv.as_ref(),
            &schema::grant_key(user_id, grant_id),
        )
        .await?;

        info!(grant_id = %grant_id, user_id = %user_id, tokens_deleted = deleted, "Grant revoked");
        debug!(prefix = %prefix, "Token prefix drained");
        Ok(())
    }
}
