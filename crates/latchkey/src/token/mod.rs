//! Token string format and token issuance.

pub mod format;
pub mod service;

pub use format::{MalformedToken, ParsedToken, mint_token_string, token_hash};
pub use service::{MintedAccessToken, TokenIssuer};
