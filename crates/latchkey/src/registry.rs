//! Client registry: CRUD and paginated listing over the store.
//!
//! Secrets are generated for confidential clients only; the plaintext is
//! surfaced exactly once at creation (and when explicitly replaced) while
//! only its SHA-256 hex is persisted.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info};

use crate::crypto;
use crate::OAuthResult;
use crate::error::OAuthError;
use crate::kv::{KvListOptions, KvStore};
use crate::schema;
use crate::types::{ClientInfo, ListOptions, TokenEndpointAuthMethod};

/// Length of generated client identifiers.
pub const CLIENT_ID_LENGTH: usize = 16;

/// Length of generated client secrets.
pub const CLIENT_SECRET_LENGTH: usize = 32;

/// Default grant types for clients that do not declare any.
pub const DEFAULT_GRANT_TYPES: [&str; 2] = ["authorization_code", "refresh_token"];

/// Default response types for clients that do not declare any.
pub const DEFAULT_RESPONSE_TYPES: [&str; 1] = ["code"];

/// Input for [`ClientRegistry::create`].
#[derive(Debug, Clone, Default)]
pub struct ClientRegistration {
    /// Redirect URIs; at least one is required.
    pub redirect_uris: Vec<String>,
    /// How the client will authenticate at the token endpoint.
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,
    /// Declared grant types; defaults applied when empty.
    pub grant_types: Vec<String>,
    /// Declared response types; defaults applied when empty.
    pub response_types: Vec<String>,
    /// Human-readable client name.
    pub client_name: Option<String>,
    /// URL of the client's logo.
    pub logo_uri: Option<String>,
    /// URL of the client's home page.
    pub client_uri: Option<String>,
    /// URL of the client's privacy policy.
    pub policy_uri: Option<String>,
    /// URL of the client's terms of service.
    pub tos_uri: Option<String>,
    /// URL of the client's JWK Set document.
    pub jwks_uri: Option<String>,
    /// Contact addresses.
    pub contacts: Option<Vec<String>>,
}

/// Partial update for [`ClientRegistry::update`]. `None` fields are left
/// unchanged; the client id and registration date are never mutated.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    /// Replacement redirect URIs.
    pub redirect_uris: Option<Vec<String>>,
    /// Replacement auth method. Switching to `none` erases the stored
    /// secret.
    pub token_endpoint_auth_method: Option<TokenEndpointAuthMethod>,
    /// A new plaintext secret to hash and store (confidential clients
    /// only).
    pub client_secret: Option<String>,
    /// Replacement grant types.
    pub grant_types: Option<Vec<String>>,
    /// Replacement response types.
    pub response_types: Option<Vec<String>>,
    /// Replacement client name.
    pub client_name: Option<String>,
    /// Replacement logo URI.
    pub logo_uri: Option<String>,
    /// Replacement client URI.
    pub client_uri: Option<String>,
    /// Replacement policy URI.
    pub policy_uri: Option<String>,
    /// Replacement terms-of-service URI.
    pub tos_uri: Option<String>,
    /// Replacement JWK Set URI.
    pub jwks_uri: Option<String>,
    /// Replacement contacts.
    pub contacts: Option<Vec<String>>,
}

/// Result of a client creation: the stored record plus the one-time
/// plaintext secret for confidential clients.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    /// The stored client record (secret hashed).
    pub client: ClientInfo,
    /// The plaintext secret. `None` for public clients. Not recoverable
    /// later.
    pub client_secret: Option<String>,
}

/// One page of a client listing.
#[derive(Debug, Clone)]
pub struct ClientListPage {
    /// Clients in this page.
    pub clients: Vec<ClientInfo>,
    /// Continuation cursor; `None` once the listing is complete.
    pub cursor: Option<String>,
}

/// Client persistence operations.
#[derive(Clone)]
pub struct ClientRegistry {
    kv: Arc<dyn KvStore>,
}

impl ClientRegistry {
    /// Creates a registry over the given store.
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Look up a client by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn get(&self, client_id: &str) -> OAuthResult<Option<ClientInfo>> {
        schema::get_json(self.kv.as_ref(), &schema::client_key(client_id)).await
    }

    /// Create a client, generating its id and (for confidential clients) a
    /// secret.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClientMetadata` when no redirect URI is supplied, or
    /// a storage error.
    pub async fn create(
        &self,
        registration: ClientRegistration,
    ) -> OAuthResult<RegisteredClient> {
        if registration.redirect_uris.is_empty() {
            return Err(OAuthError::invalid_client_metadata(
                "At least one redirect URI is required",
            ));
        }

        let client_id = crypto::random_string(CLIENT_ID_LENGTH);
        let confidential =
            registration.token_endpoint_auth_method != TokenEndpointAuthMethod::None;
        let client_secret = confidential.then(|| crypto::random_string(CLIENT_SECRET_LENGTH));

        let grant_types = if registration.grant_types.is_empty() {
            DEFAULT_GRANT_TYPES.iter().map(ToString::to_string).collect()
        } else {
            registration.grant_types
        };
        let response_types = if registration.response_types.is_empty() {
            DEFAULT_RESPONSE_TYPES
                .iter()
                .map(ToString::to_string)
                .collect()
        } else {
            registration.response_types
        };

        let client = ClientInfo {
            client_id: client_id.clone(),
            client_secret: client_secret.as_deref().map(crypto::sha256_hex),
            redirect_uris: registration.redirect_uris,
            token_endpoint_auth_method: registration.token_endpoint_auth_method,
            grant_types,
            response_types,
            client_name: registration.client_name,
            logo_uri: registration.logo_uri,
            client_uri: registration.client_uri,
            policy_uri: registration.policy_uri,
            tos_uri: registration.tos_uri,
            jwks_uri: registration.jwks_uri,
            contacts: registration.contacts,
            registration_date: Some(OffsetDateTime::now_utc().unix_timestamp()),
        };

        schema::put_json(
            self.kv.as_ref(),
            &schema::client_key(&client_id),
            &client,
            None,
        )
        .await?;

        info!(client_id = %client_id, confidential, "Client created");

        Ok(RegisteredClient {
            client,
            client_secret,
        })
    }

    /// Apply a partial update to a client.
    ///
    /// The client id is preserved. Switching the auth method to `none`
    /// erases the stored secret hash; a supplied plaintext secret for a
    /// confidential client is re-hashed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` when the client does not exist, or a storage
    /// error.
    pub async fn update(
        &self,
        client_id: &str,
        update: ClientUpdate,
    ) -> OAuthResult<ClientInfo> {
        let mut client = self
            .get(client_id)
            .await?
            .ok_or_else(|| OAuthError::invalid_client("Unknown client"))?;

        if let Some(redirect_uris) = update.redirect_uris {
            if redirect_uris.is_empty() {
                return Err(OAuthError::invalid_client_metadata(
                    "At least one redirect URI is required",
                ));
            }
            client.redirect_uris = redirect_uris;
        }
        if let Some(method) = update.token_endpoint_auth_method {
            client.token_endpoint_auth_method = method;
        }
        if let Some(secret) = update.client_secret
            && client.token_endpoint_auth_method != TokenEndpointAuthMethod::None
        {
            client.client_secret = Some(crypto::sha256_hex(&secret));
        }
        // Public clients never carry a stored secret, including records
        // downgraded from confidential.
        if client.token_endpoint_auth_method == TokenEndpointAuthMethod::None {
            client.client_secret = None;
        }
        if let Some(grant_types) = update.grant_types {
            client.grant_types = grant_types;
        }
        if let Some(response_types) = update.response_types {
            client.response_types = response_types;
        }
        if let Some(client_name) = update.client_name {
            client.client_name = Some(client_name);
        }
        if let Some(logo_uri) = update.logo_uri {
            client.logo_uri = Some(logo_uri);
        }
        if let Some(client_uri) = update.client_uri {
            client.client_uri = Some(client_uri);
        }
        if let Some(policy_uri) = update.policy_uri {
            client.policy_uri = Some(policy_uri);
        }
        if let Some(tos_uri) = update.tos_uri {
            client.tos_uri = Some(tos_uri);
        }
        if let Some(jwks_uri) = update.jwks_uri {
            client.jwks_uri = Some(jwks_uri);
        }
        if let Some(contacts) = update.contacts {
            client.contacts = Some(contacts);
        }

        schema::put_json(
            self.kv.as_ref(),
            &schema::client_key(client_id),
            &client,
            None,
        )
        .await?;

        debug!(client_id = %client_id, "Client updated");
        Ok(client)
    }

    /// Delete a client record.
    ///
    /// Does not cascade: the client's grants become unreachable via client
    /// authentication, but already-issued tokens keep validating until
    /// their TTL. Grant revocation is the operator remedy for full cutoff.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn delete(&self, client_id: &str) -> OAuthResult<()> {
        schema::delete(self.kv.as_ref(), &schema::client_key(client_id)).await?;
        info!(client_id = %client_id, "Client deleted");
        Ok(())
    }

    /// List clients one page at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn list(&self, options: ListOptions) -> OAuthResult<ClientListPage> {
        let page = self
            .kv
            .list(KvListOptions {
                prefix: schema::CLIENT_PREFIX.to_string(),
                limit: options.limit,
                cursor: options.cursor,
            })
            .await
            .map_err(|e| OAuthError::storage(e.to_string()))?;

        let mut clients = Vec::with_capacity(page.keys.len());
        for key in &page.keys {
            // A record can vanish between the list and the get; skip it.
            if let Some(client) = schema::get_json(self.kv.as_ref(), &key.name).await? {
                clients.push(client);
            }
        }

        Ok(ClientListPage {
            clients,
            cursor: page.cursor,
        })
    }

    /// Verify a presented plaintext secret against the stored hash.
    #[must_use]
    pub fn secret_matches(client: &ClientInfo, presented: &str) -> bool {
        client
            .client_secret
            .as_deref()
            .is_some_and(|stored| stored == crypto::sha256_hex(presented))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn registry() -> ClientRegistry {
        ClientRegistry::new(Arc::new(MemoryKv::new()))
    }

    fn basic_registration() -> ClientRegistration {
        ClientRegistration {
            redirect_uris: vec!["https://rp.example/cb".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_confidential_client() {
        let registry = registry();
        let created = registry.create(basic_registration()).await.unwrap();

        assert_eq!(created.client.client_id.len(), CLIENT_ID_LENGTH);
        let secret = created.client_secret.unwrap();
        assert_eq!(secret.len(), CLIENT_SECRET_LENGTH);

        // Only the hash is persisted.
        let stored = registry.get(&created.client.client_id).await.unwrap().unwrap();
        assert_eq!(stored.client_secret.as_deref(), Some(crypto::sha256_hex(&secret).as_str()));
        assert!(ClientRegistry::secret_matches(&stored, &secret));
        assert!(!ClientRegistry::secret_matches(&stored, "wrong"));
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let registry = registry();
        let created = registry.create(basic_registration()).await.unwrap();

        assert_eq!(
            created.client.grant_types,
            vec!["authorization_code", "refresh_token"]
        );
        assert_eq!(created.client.response_types, vec!["code"]);
        assert!(created.client.registration_date.is_some());
    }

    #[tokio::test]
    async fn test_create_public_client_has_no_secret() {
        let registry = registry();
        let created = registry
            .create(ClientRegistration {
                token_endpoint_auth_method: TokenEndpointAuthMethod::None,
                ..basic_registration()
            })
            .await
            .unwrap();

        assert!(created.client_secret.is_none());
        assert!(created.client.client_secret.is_none());
        assert!(created.client.is_public());
    }

    #[tokio::test]
    async fn test_create_requires_redirect_uri() {
        let registry = registry();
        let result = registry.create(ClientRegistration::default()).await;
        assert!(matches!(
            result,
            Err(OAuthError::InvalidClientMetadata { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_preserves_client_id() {
        let registry = registry();
        let created = registry.create(basic_registration()).await.unwrap();
        let id = created.client.client_id.clone();

        let updated = registry
            .update(
                &id,
                ClientUpdate {
                    client_name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.client_id, id);
        assert_eq!(updated.client_name.as_deref(), Some("Renamed"));
        assert_eq!(updated.registration_date, created.client.registration_date);
    }

    #[tokio::test]
    async fn test_downgrade_to_public_erases_secret() {
        let registry = registry();
        let created = registry.create(basic_registration()).await.unwrap();

        let updated = registry
            .update(
                &created.client.client_id,
                ClientUpdate {
                    token_endpoint_auth_method: Some(TokenEndpointAuthMethod::None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(updated.client_secret.is_none());
        let stored = registry.get(&created.client.client_id).await.unwrap().unwrap();
        assert!(stored.client_secret.is_none());
    }

    #[tokio::test]
    async fn test_update_rehashes_new_secret() {
        let registry = registry();
        let created = registry.create(basic_registration()).await.unwrap();

        let updated = registry
            .update(
                &created.client.client_id,
                ClientUpdate {
                    client_secret: Some("replacement-secret".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(ClientRegistry::secret_matches(&updated, "replacement-secret"));
        assert!(!ClientRegistry::secret_matches(
            &updated,
            created.client_secret.as_deref().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_client() {
        let registry = registry();
        let result = registry.update("missing", ClientUpdate::default()).await;
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[tokio::test]
    async fn test_delete_and_list_pagination() {
        let registry = registry();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(registry.create(basic_registration()).await.unwrap().client.client_id);
        }

        let first = registry
            .list(ListOptions {
                limit: Some(2),
                cursor: None,
            })
            .await
            .unwrap();
        assert_eq!(first.clients.len(), 2);
        let cursor = first.cursor.clone().unwrap();

        let second = registry
            .list(ListOptions {
                limit: Some(2),
                cursor: Some(cursor),
            })
            .await
            .unwrap();
        assert_eq!(second.clients.len(), 1);
        assert!(second.cursor.is_none());

        registry.delete(&ids[0]).await.unwrap();
        assert!(registry.get(&ids[0]).await.unwrap().is_none());
    }
}
