//! # latchkey
//!
//! An embeddable OAuth 2.1 authorization server over an
//! eventually-consistent key-value store.
//!
//! Applications compose the provider with two handlers of their own (one
//! for unauthenticated UI and authorization pages, one for protected API
//! resources) and delegate the standards-level concerns to the library:
//! token issuance and validation, client registration, PKCE, refresh
//! rotation, metadata discovery, CORS, and at-rest encryption of per-grant
//! application state ("props").
//!
//! The distinguishing mechanism is token-keyed wrapping: the key that
//! encrypts a grant's props is stored only wrapped under keys derived from
//! the live token strings, so props are recoverable exactly while an
//! unhashed token is presented and are inert to anyone holding a copy of
//! the store.
//!
//! ## Modules
//!
//! - [`OAuthProvider`] - construction and dispatch
//! - [`authorize`] - the helper surface for login/consent handlers
//! - [`registry`] - client CRUD and listing
//! - [`token`] - token string format, issuance, redemption, rotation
//! - [`pkce`] - RFC 7636 challenge verification
//! - [`kv`] - the store contract plus an in-memory backend
//! - [`crypto`] - hashing, props encryption, token-keyed wrapping
//! - [`handler`] - the application handler contract
//! - [`types`] - persisted records
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use latchkey::{MemoryKv, OAuthProvider, OAuthProviderOptions, RequestHandler};
//!
//! let provider = OAuthProvider::new(
//!     Arc::new(MemoryKv::new()),
//!     OAuthProviderOptions::new(
//!         RequestHandler::shared(MyApi),
//!         RequestHandler::shared(MyUi),
//!     )
//!     .with_api_route("/api/"),
//! )?;
//! ```

pub mod authorize;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handler;
mod http;
pub mod kv;
pub mod pkce;
pub mod registry;
pub mod schema;
pub mod token;
pub mod types;

mod provider;

pub use authorize::{
    AuthRequest, CompleteAuthorization, CompletedAuthorization, GRANT_ID_LENGTH, GrantListPage,
    OAuthHelpers, ResponseType,
};
pub use config::{DEFAULT_ACCESS_TOKEN_TTL, OAuthProviderOptions};
pub use error::OAuthError;
pub use handler::{Handler, HandlerFactory, HandlerRequest, RequestContext, RequestHandler};
pub use http::metadata::{
    AuthorizationServerMetadata, CODE_CHALLENGE_METHODS_SUPPORTED, GRANT_TYPES_SUPPORTED,
    RESPONSE_MODES_SUPPORTED, TOKEN_ENDPOINT_AUTH_METHODS_SUPPORTED, WELL_KNOWN_METADATA_PATH,
};
pub use kv::{KvError, KvKey, KvListOptions, KvListPage, KvPutOptions, KvResult, KvStore, MemoryKv};
pub use pkce::CodeChallengeMethod;
pub use provider::OAuthProvider;
pub use registry::{
    ClientListPage, ClientRegistration, ClientRegistry, ClientUpdate, RegisteredClient,
};
pub use token::service::TokenResponse;
pub use types::{
    AccessTokenRecord, ClientInfo, Grant, GrantSnapshot, GrantSummary, ListOptions,
    TokenEndpointAuthMethod,
};

/// Type alias for results of authorization server operations.
pub type OAuthResult<T> = Result<T, OAuthError>;
