//! Derivative metadata cache
//!
//! Maps a [`ThumbnailKey`] to its [`DerivativeMeta`] so steady-state requests
//! skip storage probes and transforms entirely. The backing [`MetaStore`] is
//! injected: an in-process map or Redis. Losing the store is harmless; the
//! engine falls back to a storage existence check.
//!
//! With the reverse index enabled every entry is also recorded in a per-source
//! set, which makes [`MetaCache::invalidate_source`] exact. The set shares the
//! entry TTL, so expired derivatives do not pile up in it. Without the index,
//! source invalidation is a no-op and the entry TTL bounds staleness.

mod memory;
mod redis_store;

pub use self::memory::MemoryMetaStore;
pub use self::redis_store::{RedisMetaStore, SharedRedis};

use crate::error::CacheResult;
use crate::keys::{KeyCodec, ThumbnailKey};
use crate::metrics::ThumbnailMetrics;
use crate::source::SourceRef;
use crate::transform::OutputFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Metadata of a stored derivative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeMeta {
    pub key: ThumbnailKey,
    pub source: String,
    pub storage_path: String,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

/// Raw key-value operations behind the metadata cache
#[async_trait::async_trait]
pub trait MetaStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value; `None` TTL never expires
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Add to a set; a TTL (re)arms expiry of the whole set
    async fn add_member(
        &self,
        set: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()>;

    async fn remove_member(&self, set: &str, member: &str) -> CacheResult<()>;

    async fn members(&self, set: &str) -> CacheResult<Vec<String>>;
}

/// Typed metadata cache
#[derive(Clone)]
pub struct MetaCache {
    store: Arc<dyn MetaStore>,
    ttl: Option<Duration>,
    reverse_index: bool,
    metrics: ThumbnailMetrics,
}

impl MetaCache {
    pub fn new(store: Arc<dyn MetaStore>, ttl: Option<Duration>, reverse_index: bool) -> Self {
        Self {
            store,
            ttl,
            reverse_index,
            metrics: ThumbnailMetrics::new(),
        }
    }

    /// Look up metadata; corrupted entries are dropped and reported as a miss
    pub async fn get(&self, key: &ThumbnailKey) -> CacheResult<Option<DerivativeMeta>> {
        let entry_key = KeyCodec::meta_key(key);

        let raw = match self.store.get(&entry_key).await? {
            Some(raw) => raw,
            None => {
                debug!(key = %key, "Metadata cache miss");
                self.metrics.record_cache_op("miss");
                return Ok(None);
            }
        };

        match serde_json::from_str::<DerivativeMeta>(&raw) {
            Ok(meta) => {
                debug!(key = %key, "Metadata cache hit");
                self.metrics.record_cache_op("hit");
                Ok(Some(meta))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Metadata deserialization failed");
                self.metrics.record_cache_op("corrupt");
                if let Err(e) = self.store.del(&entry_key).await {
                    warn!(key = %key, error = %e, "Failed to drop corrupted metadata");
                }
                Ok(None)
            }
        }
    }

    /// Record metadata for a derivative whose bytes are stored
    pub async fn set(&self, meta: &DerivativeMeta) -> CacheResult<()> {
        let payload = serde_json::to_string(meta)?;
        self.store
            .set(&KeyCodec::meta_key(&meta.key), payload, self.ttl)
            .await?;

        if self.reverse_index {
            if let Ok(source) = SourceRef::parse(&meta.source) {
                // The index lives as long as its newest entry
                self.store
                    .add_member(
                        &KeyCodec::source_index_key(&source),
                        meta.key.as_str(),
                        self.ttl,
                    )
                    .await?;
            }
        }

        debug!(key = %meta.key, path = %meta.storage_path, "Metadata cached");
        self.metrics.record_cache_op("set");
        Ok(())
    }

    /// Remove one entry (and its reverse index membership)
    pub async fn invalidate(&self, key: &ThumbnailKey) -> CacheResult<Option<DerivativeMeta>> {
        let existing = self.get(key).await?;
        self.store.del(&KeyCodec::meta_key(key)).await?;

        if self.reverse_index {
            if let Some(source) = existing
                .as_ref()
                .and_then(|meta| SourceRef::parse(&meta.source).ok())
            {
                self.store
                    .remove_member(&KeyCodec::source_index_key(&source), key.as_str())
                    .await?;
            }
        }

        debug!(key = %key, "Metadata invalidated");
        self.metrics.record_cache_op("invalidate");
        Ok(existing)
    }

    /// Remove every entry derived from `source`, returning what was removed
    pub async fn invalidate_source(&self, source: &SourceRef) -> CacheResult<Vec<DerivativeMeta>> {
        if !self.reverse_index {
            warn!(
                source = %source,
                "Reverse index disabled; derivatives expire with the cache TTL"
            );
            return Ok(Vec::new());
        }

        let index_key = KeyCodec::source_index_key(source);
        let members = self.store.members(&index_key).await?;
        let mut removed = Vec::with_capacity(members.len());

        for member in members {
            let entry_key = KeyCodec::meta_key(&ThumbnailKey::from_raw(member));
            if let Some(raw) = self.store.get(&entry_key).await? {
                if let Ok(meta) = serde_json::from_str::<DerivativeMeta>(&raw) {
                    removed.push(meta);
                }
            }
            self.store.del(&entry_key).await?;
        }
        self.store.del(&index_key).await?;

        debug!(source = %source, count = removed.len(), "Source metadata invalidated");
        self.metrics.record_cache_op("invalidate_source");
        Ok(removed)
    }
}
