//! Key-value store contract.
//!
//! The store is the single shared mutable resource of the library. It is
//! assumed eventually consistent with per-key TTLs and prefix listing with
//! an opaque cursor; staleness is tolerated by design. Implementations are
//! provided by the embedding application; [`memory::MemoryKv`] ships for
//! development and tests.

use async_trait::async_trait;

pub mod memory;

pub use memory::MemoryKv;

/// Error raised by a store implementation. Converted to
/// [`OAuthError::Storage`](crate::OAuthError::Storage) at the library
/// boundary; no retries are performed.
#[derive(Debug, thiserror::Error)]
#[error("kv operation failed: {0}")]
pub struct KvError(pub String);

impl KvError {
    /// Creates a new store error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result alias for store operations.
pub type KvResult<T> = Result<T, KvError>;

/// Options for a `put`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KvPutOptions {
    /// Time-to-live in seconds. `None` persists the key indefinitely and
    /// clears any TTL a previous write set.
    pub expiration_ttl: Option<u64>,
}

/// Options for a prefix `list`.
#[derive(Debug, Clone, Default)]
pub struct KvListOptions {
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Maximum number of keys per page. `None` uses the store default.
    pub limit: Option<usize>,
    /// Opaque continuation cursor from a previous page.
    pub cursor: Option<String>,
}

/// A single key in a list page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvKey {
    /// The full key name.
    pub name: String,
}

/// One page of a prefix listing.
#[derive(Debug, Clone)]
pub struct KvListPage {
    /// Keys in this page, in store order.
    pub keys: Vec<KvKey>,
    /// Continuation cursor. `None` once the listing is complete.
    pub cursor: Option<String>,
    /// `true` when no further pages remain.
    pub list_complete: bool,
}

/// The store operations the library relies on.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. Returns `None` for absent or expired keys.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Write a value, replacing any existing entry and its TTL.
    async fn put(&self, key: &str, value: String, options: KvPutOptions) -> KvResult<()>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> KvResult<()>;

    /// List keys under a prefix, one page at a time.
    async fn list(&self, options: KvListOptions) -> KvResult<KvListPage>;
}
