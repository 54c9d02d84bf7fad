//! Error types for the authorization server.
//!
//! Every library-originated failure is an [`OAuthError`]. Each variant maps
//! to one of the OAuth 2.0 / RFC 7591 error codes plus an HTTP status, so
//! HTTP handlers can render the standard `{error, error_description}` body
//! without re-classifying.

use axum::http::StatusCode;

/// Errors that can occur during authorization server operations.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// The request is malformed: bad parameters, wrong method, oversized
    /// payload. The status is carried per-instance because the same error
    /// code covers 400, 405 and 413 responses.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
        /// HTTP status to respond with (400, 405 or 413).
        status: u16,
    },

    /// The client is unknown or its credentials are wrong.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization code or refresh token is invalid, expired, already
    /// used, or was issued to another client; also PKCE and redirect-URI
    /// failures at the token endpoint.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The `grant_type` is not one the server supports.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// Dynamic registration metadata failed validation (RFC 7591).
    #[error("Invalid client metadata: {message}")]
    InvalidClientMetadata {
        /// Description of the metadata problem.
        message: String,
    },

    /// The bearer token on an API request is missing, malformed, unknown or
    /// expired.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// A disabled endpoint was invoked.
    #[error("Not implemented: {message}")]
    NotImplemented {
        /// Description of what is not implemented.
        message: String,
    },

    /// The key-value store failed. Transient failures propagate; the library
    /// performs no retries.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// A cryptographic operation failed. With well-formed stored records
    /// this indicates data corruption, never bad client input.
    #[error("Crypto error: {message}")]
    Crypto {
        /// Description of the crypto failure.
        message: String,
    },

    /// The provider was constructed with invalid options.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl OAuthError {
    /// Creates a new `InvalidRequest` error with a 400 status.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            status: 400,
        }
    }

    /// Creates an `InvalidRequest` error with an explicit status
    /// (405 for a disallowed method, 413 for an oversized payload).
    #[must_use]
    pub fn invalid_request_with_status(message: impl Into<String>, status: u16) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            status,
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `InvalidClientMetadata` error.
    #[must_use]
    pub fn invalid_client_metadata(message: impl Into<String>) -> Self {
        Self::InvalidClientMetadata {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `NotImplemented` error.
    #[must_use]
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Crypto` error.
    #[must_use]
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns the OAuth error code for the wire-format error body.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::InvalidClientMetadata { .. } => "invalid_client_metadata",
            Self::InvalidToken { .. } => "invalid_token",
            Self::NotImplemented { .. } => "not_implemented",
            Self::Storage { .. } | Self::Crypto { .. } | Self::Configuration { .. } => {
                "server_error"
            }
        }
    }

    /// Returns the human-readable description for the error body.
    #[must_use]
    pub fn error_description(&self) -> String {
        match self {
            Self::InvalidRequest { message, .. }
            | Self::InvalidClient { message }
            | Self::InvalidGrant { message }
            | Self::InvalidClientMetadata { message }
            | Self::InvalidToken { message }
            | Self::NotImplemented { message }
            | Self::Storage { message }
            | Self::Crypto { message }
            | Self::Configuration { message } => message.clone(),
            Self::UnsupportedGrantType { grant_type } => {
                format!("Grant type '{grant_type}' is not supported")
            }
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            Self::InvalidClient { .. } | Self::InvalidToken { .. } => StatusCode::UNAUTHORIZED,
            Self::InvalidGrant { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::InvalidClientMetadata { .. } => StatusCode::BAD_REQUEST,
            Self::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::Storage { .. } | Self::Crypto { .. } | Self::Configuration { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
