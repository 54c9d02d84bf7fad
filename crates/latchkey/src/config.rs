//! Provider configuration.
//!
//! [`OAuthProviderOptions`] is the user-facing record; construction of the
//! provider normalizes it into a [`ProviderConfig`] and raises
//! `Configuration` errors for anything invalid. Endpoints may be given as
//! absolute paths (resolved against each request's origin) or as full URLs.

use url::Url;

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::handler::RequestHandler;

/// Default access-token lifetime in seconds.
pub const DEFAULT_ACCESS_TOKEN_TTL: u64 = 3600;

/// Configuration for [`OAuthProvider`](crate::OAuthProvider).
pub struct OAuthProviderOptions {
    /// URL prefixes routed through the API gate. At least one is required.
    pub api_routes: Vec<String>,

    /// Handler for requests matching an API route. Invoked with the
    /// decrypted grant props on the request context.
    pub api_handler: RequestHandler,

    /// Handler for everything else: authorization UI, login, consent.
    pub default_handler: RequestHandler,

    /// Authorization endpoint, as an absolute path or full URL. Served by
    /// the default handler; advertised in the metadata document.
    pub authorize_endpoint: String,

    /// Token endpoint, as an absolute path or full URL.
    pub token_endpoint: String,

    /// Dynamic client registration endpoint. `None` disables registration.
    pub client_registration_endpoint: Option<String>,

    /// Scopes advertised in the metadata document.
    pub scopes_supported: Option<Vec<String>>,

    /// Access-token lifetime in seconds.
    pub access_token_ttl: u64,

    /// Whether the `token` response type (implicit flow) is allowed.
    pub allow_implicit_flow: bool,

    /// Whether dynamic registration of public clients is refused.
    pub disallow_public_client_registration: bool,
}

impl OAuthProviderOptions {
    /// Creates options with default endpoints and lifetimes.
    #[must_use]
    pub fn new(api_handler: RequestHandler, default_handler: RequestHandler) -> Self {
        Self {
            api_routes: Vec::new(),
            api_handler,
            default_handler,
            authorize_endpoint: "/oauth/authorize".to_string(),
            token_endpoint: "/oauth/token".to_string(),
            client_registration_endpoint: None,
            scopes_supported: None,
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL,
            allow_implicit_flow: false,
            disallow_public_client_registration: false,
        }
    }

    /// Adds an API route prefix.
    #[must_use]
    pub fn with_api_route(mut self, route: impl Into<String>) -> Self {
        self.api_routes.push(route.into());
        self
    }

    /// Sets the authorization endpoint.
    #[must_use]
    pub fn with_authorize_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorize_endpoint = endpoint.into();
        self
    }

    /// Sets the token endpoint.
    #[must_use]
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    /// Enables dynamic client registration at the given endpoint.
    #[must_use]
    pub fn with_client_registration_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.client_registration_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the advertised scopes.
    #[must_use]
    pub fn with_scopes_supported(mut self, scopes: Vec<String>) -> Self {
        self.scopes_supported = Some(scopes);
        self
    }

    /// Sets the access-token lifetime in seconds.
    #[must_use]
    pub fn with_access_token_ttl(mut self, seconds: u64) -> Self {
        self.access_token_ttl = seconds;
        self
    }

    /// Allows the implicit (`token` response type) flow.
    #[must_use]
    pub fn with_implicit_flow(mut self) -> Self {
        self.allow_implicit_flow = true;
        self
    }

    /// Refuses dynamic registration of public clients.
    #[must_use]
    pub fn without_public_client_registration(mut self) -> Self {
        self.disallow_public_client_registration = true;
        self
    }
}

/// A configured endpoint, normalized for matching and resolution.
#[derive(Debug, Clone)]
pub(crate) struct Endpoint {
    raw: String,
    path: String,
}

impl Endpoint {
    pub(crate) fn parse(raw: &str) -> OAuthResult<Self> {
        if let Some(rest) = raw.strip_prefix('/') {
            if rest.is_empty() || raw.contains(char::is_whitespace) {
                return Err(OAuthError::configuration(format!(
                    "Invalid endpoint path: {raw}"
                )));
            }
            return Ok(Self {
                raw: raw.to_string(),
                path: raw.to_string(),
            });
        }

        let url = Url::parse(raw).map_err(|e| {
            OAuthError::configuration(format!(
                "Endpoint must be an absolute path or full URL ({raw}): {e}"
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OAuthError::configuration(format!(
                "Endpoint URL must be http(s): {raw}"
            )));
        }
        Ok(Self {
            raw: raw.to_string(),
            path: url.path().to_string(),
        })
    }

    /// The path component used for request matching.
    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    /// Whether a request path hits this endpoint.
    pub(crate) fn matches(&self, path: &str) -> bool {
        self.path == path
    }

    /// The fully-qualified URL of this endpoint, resolving path-style
    /// configuration against the request origin.
    pub(crate) fn resolve(&self, origin: &Url) -> OAuthResult<String> {
        if self.raw.starts_with('/') {
            origin
                .join(&self.raw)
                .map(|url| url.to_string())
                .map_err(|e| OAuthError::configuration(format!("Cannot resolve endpoint: {e}")))
        } else {
            Ok(self.raw.clone())
        }
    }
}

/// A configured API route prefix.
#[derive(Debug, Clone)]
pub(crate) struct ApiRoute {
    host: Option<String>,
    path_prefix: String,
}

impl ApiRoute {
    pub(crate) fn parse(raw: &str) -> OAuthResult<Self> {
        if raw.starts_with('/') {
            return Ok(Self {
                host: None,
                path_prefix: raw.to_string(),
            });
        }

        let url = Url::parse(raw).map_err(|e| {
            OAuthError::configuration(format!(
                "API route must be an absolute path or full URL ({raw}): {e}"
            ))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| {
                OAuthError::configuration(format!("API route URL must have a host: {raw}"))
            })?
            .to_string();
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };
        Ok(Self {
            host: Some(host),
            path_prefix: url.path().to_string(),
        })
    }

    /// Whether a request with the given host and path falls under this
    /// route.
    pub(crate) fn matches(&self, host: Option<&str>, path: &str) -> bool {
        if let Some(expected) = &self.host
            && host != Some(expected.as_str())
        {
            return false;
        }
        path.starts_with(&self.path_prefix)
    }

    /// Whether this route's path space covers the given endpoint path.
    /// Endpoints are matched by path alone during dispatch, so the host
    /// pin of the route is irrelevant here.
    pub(crate) fn covers(&self, path: &str) -> bool {
        path.starts_with(&self.path_prefix)
    }
}

/// Normalized, handler-free configuration shared across the provider.
#[derive(Debug, Clone)]
pub(crate) struct ProviderConfig {
    pub authorize_endpoint: Endpoint,
    pub token_endpoint: Endpoint,
    pub registration_endpoint: Option<Endpoint>,
    pub api_routes: Vec<ApiRoute>,
    pub scopes_supported: Option<Vec<String>>,
    pub access_token_ttl: u64,
    pub allow_implicit_flow: bool,
    pub disallow_public_client_registration: bool,
}

impl ProviderConfig {
    /// Validate and normalize user-facing options.
    pub(crate) fn from_options(options: &OAuthProviderOptions) -> OAuthResult<Self> {
        if options.api_routes.is_empty() {
            return Err(OAuthError::configuration(
                "At least one API route is required",
            ));
        }
        if options.access_token_ttl == 0 {
            return Err(OAuthError::configuration(
                "accessTokenTTL must be positive",
            ));
        }

        let authorize_endpoint = Endpoint::parse(&options.authorize_endpoint)?;
        let token_endpoint = Endpoint::parse(&options.token_endpoint)?;
        let registration_endpoint = options
            .client_registration_endpoint
            .as_deref()
            .map(Endpoint::parse)
            .transpose()?;

        if authorize_endpoint.path() == token_endpoint.path() {
            return Err(OAuthError::configuration(
                "Authorization and token endpoints must differ",
            ));
        }
        if let Some(registration) = &registration_endpoint
            && (registration.path() == token_endpoint.path()
                || registration.path() == authorize_endpoint.path())
        {
            return Err(OAuthError::configuration(
                "Registration endpoint collides with another endpoint",
            ));
        }

        let api_routes = options
            .api_routes
            .iter()
            .map(|route| ApiRoute::parse(route))
            .collect::<Result<Vec<_>, _>>()?;

        // First-party endpoints are dispatched ahead of the API gate, so a
        // route prefix covering an endpoint path silently shadows part of
        // the API space.
        let mut endpoint_paths = vec![authorize_endpoint.path(), token_endpoint.path()];
        if let Some(registration) = &registration_endpoint {
            endpoint_paths.push(registration.path());
        }
        for route in &api_routes {
            if let Some(path) = endpoint_paths
                .iter()
                .copied()
                .find(|&path| route.covers(path))
            {
                return Err(OAuthError::configuration(format!(
                    "API route collides with the endpoint at {path}"
                )));
            }
        }

        Ok(Self {
            authorize_endpoint,
            token_endpoint,
            registration_endpoint,
            api_routes,
            scopes_supported: options.scopes_supported.clone(),
            access_token_ttl: options.access_token_ttl,
            allow_implicit_flow: options.allow_implicit_flow,
            disallow_public_client_registration: options.disallow_public_client_registration,
        })
    }

    /// Whether a request with the given host and path falls under an API
    /// route.
    pub(crate) fn matches_api_route(&self, host: Option<&str>, path: &str) -> bool {
        self.api_routes
            .iter()
            .any(|route| route.matches(host, path))
    }
}
