//! PKCE (Proof Key for Code Exchange, RFC 7636).
//!
//! Both the `plain` and `S256` methods are supported; `plain` is the default
//! when an authorization request carries a challenge without naming a method.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

/// PKCE code challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodeChallengeMethod {
    /// The verifier is compared to the challenge directly.
    #[default]
    Plain,
    /// The challenge is `BASE64URL(SHA256(ASCII(code_verifier)))`.
    S256,
}

impl CodeChallengeMethod {
    /// Parse a challenge method from its wire representation.
    ///
    /// Returns `None` for unknown methods.
    #[must_use]
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "plain" => Some(Self::Plain),
            "S256" => Some(Self::S256),
            _ => None,
        }
    }

    /// Returns the wire representation of the method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute the S256 challenge for a verifier.
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Verify a code verifier against a stored challenge.
#[must_use]
pub fn verify(method: CodeChallengeMethod, challenge: &str, verifier: &str) -> bool {
    match method {
        CodeChallengeMethod::Plain => verifier == challenge,
        CodeChallengeMethod::S256 => s256_challenge(verifier) == challenge,
    }
}
