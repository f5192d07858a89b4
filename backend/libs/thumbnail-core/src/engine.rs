//! Thumbnail engine - coordinates key derivation, metadata lookup, storage and
//! transforms
//!
//! Each request runs the same protocol:
//! 1. Validate and canonicalize geometry and options (the only validation point)
//! 2. Derive the thumbnail key and storage path
//! 3. Metadata cache hit: return immediately, no storage I/O
//! 4. Storage hit: probe the stored header, repopulate the cache, return
//! 5. Storage miss: fetch source, transform, store, then record metadata
//!
//! Metadata is only written after the bytes are confirmed stored. Concurrent
//! cold requests for one key may both transform; the storage atomic replace
//! makes the last writer win.

use crate::config::ThumbnailSettings;
use crate::error::{Result, StorageError};
use crate::geometry::Geometry;
use crate::keys::{KeyCodec, ThumbnailKey};
use crate::metacache::{DerivativeMeta, MetaCache, MetaStore};
use crate::metrics::ThumbnailMetrics;
use crate::options::{OptionSchema, OptionSet};
use crate::registry;
use crate::source::{HttpFetcher, SourceFetcher, SourceRef, SourceRouter, StorageFetcher};
use crate::storage::StorageBackend;
use crate::transform::{ImageTransformer, Transformer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A validated, canonical thumbnail request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    source: SourceRef,
    geometry: Geometry,
    options: OptionSet,
    key: ThumbnailKey,
    storage_path: String,
}

impl ThumbnailRequest {
    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    pub fn key(&self) -> &ThumbnailKey {
        &self.key
    }

    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }
}

/// How a request was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    CacheHit,
    StorageHit,
    Generated,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::CacheHit => "cache_hit",
            Outcome::StorageHit => "storage_hit",
            Outcome::Generated => "generated",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub meta: DerivativeMeta,
    pub outcome: Outcome,
}

/// What the rendering layer receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub meta: DerivativeMeta,
}

/// Central coordinator; cheap to clone and safe to share across tasks
#[derive(Clone)]
pub struct ThumbnailEngine {
    settings: Arc<ThumbnailSettings>,
    schema: Arc<OptionSchema>,
    codec: KeyCodec,
    storage: Arc<dyn StorageBackend>,
    cache: MetaCache,
    fetcher: Arc<dyn SourceFetcher>,
    transformer: Arc<dyn Transformer>,
    metrics: ThumbnailMetrics,
}

impl ThumbnailEngine {
    pub fn builder(settings: ThumbnailSettings) -> ThumbnailEngineBuilder {
        ThumbnailEngineBuilder::new(settings)
    }

    /// Build an engine with every backend selected by `settings`
    pub async fn from_settings(settings: ThumbnailSettings) -> Result<Self> {
        Self::builder(settings).build().await
    }

    pub fn settings(&self) -> &ThumbnailSettings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn cache(&self) -> &MetaCache {
        &self.cache
    }

    /// Validate and canonicalize a request and derive its identity
    pub fn prepare<S: AsRef<str>>(
        &self,
        source: &str,
        geometry: &str,
        tokens: &[S],
    ) -> Result<ThumbnailRequest> {
        let source = SourceRef::parse(source)?;
        let options = self.schema.parse(tokens)?;
        let geometry = Geometry::parse(geometry)?.with_options(&options);

        let key = self.codec.derive_key(&source, &geometry, &options);
        let storage_path = self.codec.storage_path(&key, &source, &geometry, &options);

        Ok(ThumbnailRequest {
            source,
            geometry,
            options,
            key,
            storage_path,
        })
    }

    /// Run the lookup/generate protocol for a prepared request
    pub async fn resolve(&self, request: &ThumbnailRequest) -> Result<Resolved> {
        match self.resolve_inner(request).await {
            Ok(resolved) => {
                self.metrics.record_outcome(resolved.outcome.as_str());
                Ok(resolved)
            }
            Err(e) => {
                self.metrics.record_error(e.kind());
                Err(e)
            }
        }
    }

    async fn resolve_inner(&self, request: &ThumbnailRequest) -> Result<Resolved> {
        let key = &request.key;

        match self.cache.get(key).await {
            Ok(Some(meta)) => {
                debug!(key = %key, path = %meta.storage_path, "Serving from metadata cache");
                return Ok(Resolved {
                    meta,
                    outcome: Outcome::CacheHit,
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Metadata cache unavailable, treating as miss");
            }
        }

        if self.storage.exists(&request.storage_path).await? {
            if let Some(meta) = self.probe_stored(request).await? {
                self.remember(&meta).await;
                return Ok(Resolved {
                    meta,
                    outcome: Outcome::StorageHit,
                });
            }
        }

        let meta = self.generate(request).await?;
        self.remember(&meta).await;
        Ok(Resolved {
            meta,
            outcome: Outcome::Generated,
        })
    }

    /// Read dimensions of an already stored derivative; `None` means regenerate
    async fn probe_stored(&self, request: &ThumbnailRequest) -> Result<Option<DerivativeMeta>> {
        let data = match self.storage.read(&request.storage_path).await {
            Ok(data) => data,
            Err(StorageError::NotFound(_)) => {
                debug!(key = %request.key, "Stored derivative vanished before read");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match self.transformer.probe(data).await {
            Ok(info) => {
                debug!(
                    key = %request.key,
                    width = info.width,
                    height = info.height,
                    "Stored derivative probed"
                );
                Ok(Some(DerivativeMeta {
                    key: request.key.clone(),
                    source: request.source.as_str().to_string(),
                    storage_path: request.storage_path.clone(),
                    width: info.width,
                    height: info.height,
                    format: info.format,
                }))
            }
            Err(e) => {
                warn!(
                    key = %request.key,
                    path = %request.storage_path,
                    error = %e,
                    "Stored derivative unreadable, regenerating"
                );
                Ok(None)
            }
        }
    }

    async fn generate(&self, request: &ThumbnailRequest) -> Result<DerivativeMeta> {
        info!(
            key = %request.key,
            source = %request.source,
            geometry = %request.geometry,
            options = %request.options,
            "Generating thumbnail"
        );

        let original = self.fetcher.fetch(&request.source).await?;
        let output = self
            .transformer
            .transform(original, &request.geometry, &request.options)
            .await?;

        self.storage
            .write(&request.storage_path, output.data.clone())
            .await?;

        info!(
            key = %request.key,
            path = %request.storage_path,
            width = output.width,
            height = output.height,
            size = output.data.len(),
            "Thumbnail stored"
        );

        Ok(DerivativeMeta {
            key: request.key.clone(),
            source: request.source.as_str().to_string(),
            storage_path: request.storage_path.clone(),
            width: output.width,
            height: output.height,
            format: output.format,
        })
    }

    /// Cache writes after a confirmed store are best effort
    async fn remember(&self, meta: &DerivativeMeta) {
        if let Err(e) = self.cache.set(meta).await {
            warn!(key = %meta.key, error = %e, "Failed to cache derivative metadata");
        }
    }

    /// Produce a thumbnail for the rendering layer
    ///
    /// Returns `Ok(None)` in lenient mode when the source or transform fails.
    /// Validation and storage errors always propagate.
    pub async fn render<S: AsRef<str>>(
        &self,
        source: &str,
        geometry: &str,
        tokens: &[S],
    ) -> Result<Option<Thumbnail>> {
        let request = self.prepare(source, geometry, tokens)?;
        self.render_request(&request).await
    }

    pub async fn render_request(&self, request: &ThumbnailRequest) -> Result<Option<Thumbnail>> {
        match self.resolve(request).await {
            Ok(resolved) => {
                let meta = resolved.meta;
                Ok(Some(Thumbnail {
                    url: self.storage.url(&meta.storage_path),
                    width: meta.width,
                    height: meta.height,
                    meta,
                }))
            }
            Err(e) if e.is_recoverable() && self.settings.is_lenient() => {
                warn!(
                    source = %request.source,
                    key = %request.key,
                    error = %e,
                    "Thumbnail unavailable, returning empty result"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove one derivative: metadata first, then stored bytes
    ///
    /// Returns whether stored bytes existed.
    pub async fn delete(&self, request: &ThumbnailRequest) -> Result<bool> {
        self.cache.invalidate(&request.key).await?;

        let existed = match self.storage.delete(&request.storage_path).await {
            Ok(()) => true,
            Err(StorageError::NotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };

        info!(key = %request.key, path = %request.storage_path, existed, "Thumbnail deleted");
        Ok(existed)
    }

    /// Remove every cached derivative of `source`, returning how many stored
    /// derivatives were deleted
    ///
    /// Relies on the reverse source index; without it nothing is found and
    /// derivatives age out with the cache TTL.
    pub async fn delete_source(&self, source: &str) -> Result<usize> {
        let source = SourceRef::parse(source)?;
        let removed = self.cache.invalidate_source(&source).await?;

        let mut deleted = 0;
        for meta in &removed {
            match self.storage.delete(&meta.storage_path).await {
                Ok(()) => deleted += 1,
                Err(StorageError::NotFound(_)) => {
                    debug!(path = %meta.storage_path, "Derivative already gone");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(source = %source, deleted, "Source derivatives deleted");
        Ok(deleted)
    }
}

/// Assembles a [`ThumbnailEngine`], falling back to configured backends for
/// any collaborator not injected
pub struct ThumbnailEngineBuilder {
    settings: ThumbnailSettings,
    schema: Option<Arc<OptionSchema>>,
    storage: Option<Arc<dyn StorageBackend>>,
    meta_store: Option<Arc<dyn MetaStore>>,
    fetcher: Option<Arc<dyn SourceFetcher>>,
    transformer: Option<Arc<dyn Transformer>>,
}

impl ThumbnailEngineBuilder {
    pub fn new(settings: ThumbnailSettings) -> Self {
        Self {
            settings,
            schema: None,
            storage: None,
            meta_store: None,
            fetcher: None,
            transformer: None,
        }
    }

    pub fn schema(mut self, schema: OptionSchema) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn meta_store(mut self, store: Arc<dyn MetaStore>) -> Self {
        self.meta_store = Some(store);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub async fn build(self) -> Result<ThumbnailEngine> {
        let settings = self.settings;

        let schema = match self.schema {
            Some(schema) => schema,
            None => Arc::new(OptionSchema::standard(
                settings.default_quality,
                &settings.elidable_options,
            )),
        };

        let storage = match self.storage {
            Some(storage) => storage,
            None => registry::build_storage(&settings.storage).await?,
        };

        let meta_store = match self.meta_store {
            Some(store) => store,
            None => registry::build_meta_store(&settings.metacache).await?,
        };

        let fetcher: Arc<dyn SourceFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(SourceRouter::new(
                Arc::new(HttpFetcher::new(settings.url_timeout())?),
                Arc::new(StorageFetcher::new(storage.clone())),
            )),
        };

        let transformer = self
            .transformer
            .unwrap_or_else(|| Arc::new(ImageTransformer::new()));

        let codec = KeyCodec::new(schema.clone(), settings.naming, &settings.prefix);
        let cache = MetaCache::new(
            meta_store,
            settings.metacache.ttl(),
            settings.metacache.reverse_index,
        );

        info!(
            storage = storage.name(),
            naming = ?settings.naming,
            lenient = settings.is_lenient(),
            "Thumbnail engine initialized"
        );

        Ok(ThumbnailEngine {
            settings: Arc::new(settings),
            schema,
            codec,
            storage,
            cache,
            fetcher,
            transformer,
            metrics: ThumbnailMetrics::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ThumbnailError, ValidationError};
    use crate::metacache::MemoryMetaStore;
    use crate::storage::MemoryStorage;

    async fn engine() -> ThumbnailEngine {
        ThumbnailEngine::builder(ThumbnailSettings::default())
            .storage(Arc::new(MemoryStorage::new("/media")))
            .meta_store(Arc::new(MemoryMetaStore::new()))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_prepare_canonicalizes() {
        let engine = engine().await;
        let a = engine
            .prepare("photos/pic.jpg", "240x240", &["sharpen", "crop", "quality=95"])
            .unwrap();
        let b = engine
            .prepare("photos/pic.jpg", "240x240", &["quality=95", "crop", "sharpen"])
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a.storage_path(), "photos/pic_jpg_240x240_crop_sharpen_q95.jpg");
    }

    #[tokio::test]
    async fn test_prepare_rejects_bad_input() {
        let engine = engine().await;
        let tokens: [&str; 0] = [];

        assert!(matches!(
            engine.prepare("pic.jpg", "240xABC", &tokens),
            Err(ThumbnailError::Validation(ValidationError::BadGeometry(_)))
        ));
        assert!(matches!(
            engine.prepare("pic.jpg", "240", &tokens),
            Err(ThumbnailError::Validation(ValidationError::BadGeometry(_)))
        ));
        assert!(matches!(
            engine.prepare("pic.jpg", "240x240", &["wobble"]),
            Err(ThumbnailError::Validation(ValidationError::UnknownOption(_)))
        ));
        assert!(matches!(
            engine.prepare("", "240x240", &tokens),
            Err(ThumbnailError::Validation(ValidationError::BadSource(_)))
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_derivative() {
        let engine = engine().await;
        let request = engine.prepare("pic.jpg", "100x100", &["crop"]).unwrap();
        assert!(!engine.delete(&request).await.unwrap());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::CacheHit.to_string(), "cache_hit");
        assert_eq!(Outcome::StorageHit.to_string(), "storage_hit");
        assert_eq!(Outcome::Generated.to_string(), "generated");
    }
}
