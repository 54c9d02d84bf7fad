//! The provider: construction, validation, and top-level dispatch.

use std::sync::Arc;

use axum::http::{Method, header};
use axum::response::Response;

use crate::authorize::OAuthHelpers;
use crate::config::{OAuthProviderOptions, ProviderConfig};
use crate::OAuthResult;
use crate::handler::{HandlerRequest, RequestContext, RequestHandler};
use crate::http::metadata::WELL_KNOWN_METADATA_PATH;
use crate::http::{self, api_gate, cors, metadata, register, token};
use crate::kv::KvStore;

/// An embeddable OAuth 2.1 authorization server.
///
/// One instance serves every request of the application through
/// [`handle`](Self::handle), dispatching between the discovery document,
/// the token and registration endpoints, the API gate, and the
/// application's default handler.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use latchkey::{MemoryKv, OAuthProvider, OAuthProviderOptions, RequestHandler};
///
/// let provider = OAuthProvider::new(
///     Arc::new(MemoryKv::new()),
///     OAuthProviderOptions::new(api_handler, default_handler)
///         .with_api_route("/api/")
///         .with_client_registration_endpoint("/oauth/register"),
/// )?;
///
/// // In the HTTP server's request loop:
/// let response = provider.handle(request).await;
/// ```
#[derive(Clone)]
pub struct OAuthProvider {
    config: Arc<ProviderConfig>,
    kv: Arc<dyn KvStore>,
    helpers: OAuthHelpers,
    api_handler: RequestHandler,
    default_handler: RequestHandler,
}

impl OAuthProvider {
    /// Validate the options and build a provider over the given store.
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::Configuration` for invalid options; see
    /// [`OAuthProviderOptions`].
    pub fn new(kv: Arc<dyn KvStore>, options: OAuthProviderOptions) -> OAuthResult<Self> {
        let config = ProviderConfig::from_options(&options)?;
        let helpers = OAuthHelpers::new(
            kv.clone(),
            config.access_token_ttl,
            config.allow_implicit_flow,
        );

        Ok(Self {
            config: Arc::new(config),
            kv,
            helpers,
            api_handler: options.api_handler,
            default_handler: options.default_handler,
        })
    }

    /// The helper surface, for use outside a request (management CLIs,
    /// seeding clients at startup).
    #[must_use]
    pub fn helpers(&self) -> &OAuthHelpers {
        &self.helpers
    }

    /// Serve one request.
    ///
    /// Dispatch order: preflight, discovery document, token endpoint,
    /// registration endpoint, API gate, default handler. First-party
    /// responses get CORS headers when the request names an `Origin`;
    /// default-handler responses are returned untouched.
    pub async fn handle(&self, request: HandlerRequest) -> Response {
        let origin = request.headers().get(header::ORIGIN).cloned();
        let path = request.uri().path().to_string();
        let host = http::request_host(request.uri(), request.headers()).map(str::to_string);

        let is_api_route = self.config.matches_api_route(host.as_deref(), &path);
        let is_first_party = is_api_route
            || path == WELL_KNOWN_METADATA_PATH
            || self.config.token_endpoint.matches(&path)
            || self
                .config
                .registration_endpoint
                .as_ref()
                .is_some_and(|endpoint| endpoint.matches(&path));

        if request.method() == Method::OPTIONS && is_first_party {
            return cors::preflight(origin.as_ref());
        }

        if path == WELL_KNOWN_METADATA_PATH {
            let response = metadata::handle(&self.config, request).await;
            return cors::apply(response, origin.as_ref());
        }

        if self.config.token_endpoint.matches(&path) {
            let response = token::handle(&self.config, self.kv.clone(), request).await;
            return cors::apply(response, origin.as_ref());
        }

        if let Some(endpoint) = &self.config.registration_endpoint
            && endpoint.matches(&path)
        {
            let response = register::handle(&self.config, self.kv.clone(), request).await;
            return cors::apply(response, origin.as_ref());
        }

        if is_api_route {
            let response =
                api_gate::handle(self.kv.clone(), &self.helpers, &self.api_handler, request).await;
            return cors::apply(response, origin.as_ref());
        }

        let ctx = RequestContext::new(self.helpers.clone(), None);
        self.default_handler.invoke(request, ctx).await
    }
}
