//! Persistent domain types: clients, grants, access-token records.

pub mod client;
pub mod grant;
pub mod token;

pub use client::{ClientInfo, TokenEndpointAuthMethod};
pub use grant::{Grant, GrantSummary};
pub use token::{AccessTokenRecord, GrantSnapshot};

/// Pagination options for listing operations.
///
/// The cursor is the store's opaque cursor from a previous page; `None`
/// starts from the beginning.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Maximum number of items to return. `None` uses the store default.
    pub limit: Option<usize>,
    /// Opaque continuation cursor from a previous page.
    pub cursor: Option<String>,
}
