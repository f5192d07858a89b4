//! Thumbnail key engine and cache/backend abstraction
//!
//! Generates, caches and serves resized image derivatives on demand:
//! - Canonical options with a fixed priority order
//! - Deterministic derivative keys and readable or hashed storage names
//! - Pluggable storage (local filesystem, S3, in-memory)
//! - Metadata cache over an injectable store (in-memory, Redis) with a
//!   reverse source index
//! - Lenient mode that turns source/transform failures into "no thumbnail"
//!
//! ```no_run
//! # async fn demo() -> thumbnail_core::Result<()> {
//! use thumbnail_core::{ThumbnailEngine, ThumbnailSettings};
//!
//! let engine = ThumbnailEngine::from_settings(ThumbnailSettings::from_env()?).await?;
//! if let Some(thumb) = engine
//!     .render("photos/pic.jpg", "240x240", &["crop", "quality=95"])
//!     .await?
//! {
//!     println!("{} {}x{}", thumb.url, thumb.width, thumb.height);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;
mod metrics;

pub mod geometry;
pub mod keys;
pub mod metacache;
pub mod options;
pub mod registry;
pub mod source;
pub mod storage;
pub mod transform;

pub use config::{MetaCacheSettings, StorageSettings, ThumbnailSettings};
pub use engine::{Outcome, Resolved, Thumbnail, ThumbnailEngine, ThumbnailEngineBuilder, ThumbnailRequest};
pub use error::{
    CacheError, CacheResult, Result, SourceError, StorageError, StorageResult, ThumbnailError,
    TransformError, ValidationError,
};
pub use geometry::{Geometry, ResizeStrategy};
pub use keys::{KeyCodec, NamingStrategy, ThumbnailKey, KEY_VERSION};
pub use metacache::{DerivativeMeta, MemoryMetaStore, MetaCache, MetaStore, RedisMetaStore};
pub use metrics::ThumbnailMetrics;
pub use options::{OptionSchema, OptionSet, OptionSpec, OptionValue};
pub use source::{HttpFetcher, SourceFetcher, SourceRef, SourceRouter, StorageFetcher};
pub use storage::{LocalStorage, MemoryStorage, S3Storage, S3StorageConfig, StorageBackend};
pub use transform::{ImageInfo, ImageTransformer, OutputFormat, Transformed, Transformer};
