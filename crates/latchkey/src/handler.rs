//! The contract between the provider and application handlers.
//!
//! Two handler shapes are accepted: a shared handler serving every request,
//! and a factory constructing a fresh handler per request. Both resolve to
//! the single capability "serve one request"; [`RequestHandler`] is the
//! two-variant value the provider dispatches through.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;

use crate::authorize::OAuthHelpers;

/// Request type passed to handlers.
pub type HandlerRequest = axum::extract::Request;

/// Per-request context handed to every handler invocation.
///
/// Exposes the provider's helper surface (client management, authorization
/// completion, grant management). For requests that passed the API gate,
/// [`props`](Self::props) carries the decrypted per-grant application
/// state.
#[derive(Clone)]
pub struct RequestContext {
    oauth: OAuthHelpers,
    props: Option<serde_json::Value>,
}

impl RequestContext {
    pub(crate) fn new(oauth: OAuthHelpers, props: Option<serde_json::Value>) -> Self {
        Self { oauth, props }
    }

    /// The provider helper surface.
    #[must_use]
    pub fn oauth(&self) -> &OAuthHelpers {
        &self.oauth
    }

    /// Decrypted grant props. `Some` only behind the API gate.
    #[must_use]
    pub fn props(&self) -> Option<&serde_json::Value> {
        self.props.as_ref()
    }
}

/// Serves one request.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle a request.
    async fn handle(&self, request: HandlerRequest, ctx: RequestContext) -> Response;
}

/// Builds a fresh [`Handler`] per request.
pub trait HandlerFactory: Send + Sync {
    /// Construct the handler for one request.
    fn build(&self, ctx: &RequestContext) -> Box<dyn Handler>;
}

impl<F> HandlerFactory for F
where
    F: Fn(&RequestContext) -> Box<dyn Handler> + Send + Sync,
{
    fn build(&self, ctx: &RequestContext) -> Box<dyn Handler> {
        (self)(ctx)
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(HandlerRequest, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send,
{
    async fn handle(&self, request: HandlerRequest, ctx: RequestContext) -> Response {
        (self.0)(request, ctx).await
    }
}

/// A user-supplied handler in one of the two accepted shapes.
#[derive(Clone)]
pub enum RequestHandler {
    /// One handler instance shared across requests.
    Shared(Arc<dyn Handler>),
    /// A factory invoked once per request.
    PerRequest(Arc<dyn HandlerFactory>),
}

impl RequestHandler {
    /// Wrap a shared handler.
    #[must_use]
    pub fn shared(handler: impl Handler + 'static) -> Self {
        Self::Shared(Arc::new(handler))
    }

    /// Wrap an async function or closure as a shared handler.
    #[must_use]
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(HandlerRequest, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::Shared(Arc::new(FnHandler(f)))
    }

    /// Wrap a per-request handler factory.
    #[must_use]
    pub fn per_request(factory: impl HandlerFactory + 'static) -> Self {
        Self::PerRequest(Arc::new(factory))
    }

    /// Dispatch one request.
    pub(crate) async fn invoke(&self, request: HandlerRequest, ctx: RequestContext) -> Response {
        match self {
            Self::Shared(handler) => handler.handle(request, ctx).await,
            Self::PerRequest(factory) => {
                let handler = factory.build(&ctx);
                handler.handle(request, ctx).await
            }
        }
    }
}
