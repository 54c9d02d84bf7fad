//! In-memory store backend for development and tests.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{KvError, KvKey, KvListOptions, KvListPage, KvPutOptions, KvResult, KvStore};

/// Default page size for prefix listings.
const DEFAULT_LIST_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// Unix seconds after which the entry is treated as absent.
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// In-memory [`KvStore`] with per-key TTL and ordered prefix listing.
///
/// Expired entries are treated as absent on read and skipped by listings;
/// physical removal is lazy. The list cursor is the base64url of the last
/// returned key, opaque to callers.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryKv {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn encode_cursor(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

fn decode_cursor(cursor: &str) -> KvResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| KvError::new("invalid list cursor"))?;
    String::from_utf8(bytes).map_err(|_| KvError::new("invalid list cursor"))
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now_unix()))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, options: KvPutOptions) -> KvResult<()> {
        let expires_at = options
            .expiration_ttl
            .map(|ttl| now_unix().saturating_add(ttl as i64));
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn list(&self, options: KvListOptions) -> KvResult<KvListPage> {
        let start = match &options.cursor {
            Some(cursor) => Bound::Excluded(decode_cursor(cursor)?),
            None => Bound::Included(options.prefix.clone()),
        };
        let limit = options.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        let now = now_unix();

        let entries = self.entries.read().await;
        let mut keys = Vec::new();
        let mut truncated = false;
        for (key, entry) in entries.range((start, Bound::Unbounded)) {
            if !key.starts_with(&options.prefix) {
                break;
            }
            if entry.is_expired(now) {
                continue;
            }
            if keys.len() == limit {
                truncated = true;
                break;
            }
            keys.push(KvKey { name: key.clone() });
        }

        let cursor = if truncated {
            keys.last().map(|key| encode_cursor(&key.name))
        } else {
            None
        };

        Ok(KvListPage {
            keys,
            cursor,
            list_complete: !truncated,
        })
    }
}
