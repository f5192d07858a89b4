//! Configuration for the thumbnail engine
//!
//! Settings are an explicit value object handed to the engine at
//! construction. `from_env` loads them from `THUMBNAIL_*` environment
//! variables with the defaults below.

use crate::error::{Result, ThumbnailError};
use crate::keys::NamingStrategy;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    /// Timeout for remote source fetches; `None` waits indefinitely
    pub url_timeout_secs: Option<u64>,
    /// Quality used when a request gives none
    pub default_quality: u8,
    /// Propagate source/transform errors instead of returning no thumbnail
    pub debug: bool,
    /// Value options whose default is dropped from the canonical form
    pub elidable_options: Vec<String>,
    pub naming: NamingStrategy,
    /// Directory prepended to every derivative path
    pub prefix: String,
    pub storage: StorageSettings,
    pub metacache: MetaCacheSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// `local`, `filesystem`, `s3` or `memory`
    pub backend: String,
    /// Root directory for local storage
    pub root: String,
    /// Public base URL of stored objects
    pub base_url: String,
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub path_style: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MetaCacheSettings {
    /// `memory` or `redis`
    pub backend: String,
    pub redis_url: String,
    /// Entry TTL; `None` keeps entries as a permanent index
    pub ttl_secs: Option<u64>,
    /// Track derivatives per source for exact source invalidation
    pub reverse_index: bool,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            url_timeout_secs: Some(30),
            default_quality: 85,
            debug: false,
            elidable_options: vec!["colorspace".to_string(), "format".to_string()],
            naming: NamingStrategy::Readable,
            prefix: String::new(),
            storage: StorageSettings::default(),
            metacache: MetaCacheSettings::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            root: "media".to_string(),
            base_url: "/media".to_string(),
            bucket: "thumbnails".to_string(),
            region: None,
            endpoint: None,
            path_style: false,
        }
    }
}

impl Default for MetaCacheSettings {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            redis_url: "redis://localhost".to_string(),
            ttl_secs: None,
            reverse_index: true,
        }
    }
}

impl ThumbnailSettings {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let storage = StorageSettings::default();
        let metacache = MetaCacheSettings::default();

        let url_timeout_secs = match parse_var::<u64>(&lookup, "THUMBNAIL_URL_TIMEOUT")? {
            Some(0) => None,
            Some(secs) => Some(secs),
            None => defaults.url_timeout_secs,
        };

        let default_quality =
            parse_var::<u8>(&lookup, "THUMBNAIL_QUALITY")?.unwrap_or(defaults.default_quality);
        if default_quality > 100 {
            return Err(ThumbnailError::Configuration(format!(
                "THUMBNAIL_QUALITY must be within 0..=100, got {}",
                default_quality
            )));
        }

        let elidable_options = lookup("THUMBNAIL_ELIDABLE_OPTIONS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or(defaults.elidable_options);

        let metacache_ttl = match parse_var::<u64>(&lookup, "THUMBNAIL_METACACHE_TTL")? {
            Some(0) | None => None,
            Some(secs) => Some(secs),
        };

        Ok(Self {
            url_timeout_secs,
            default_quality,
            debug: parse_var::<bool>(&lookup, "THUMBNAIL_DEBUG")?.unwrap_or(defaults.debug),
            elidable_options,
            naming: parse_var::<NamingStrategy>(&lookup, "THUMBNAIL_NAMING")?
                .unwrap_or(defaults.naming),
            prefix: lookup("THUMBNAIL_PREFIX").unwrap_or(defaults.prefix),
            storage: StorageSettings {
                backend: lookup("THUMBNAIL_STORAGE").unwrap_or(storage.backend),
                root: lookup("THUMBNAIL_STORAGE_ROOT").unwrap_or(storage.root),
                base_url: lookup("THUMBNAIL_BASE_URL").unwrap_or(storage.base_url),
                bucket: lookup("THUMBNAIL_S3_BUCKET").unwrap_or(storage.bucket),
                region: lookup("AWS_REGION"),
                endpoint: lookup("THUMBNAIL_S3_ENDPOINT"),
                path_style: parse_var::<bool>(&lookup, "THUMBNAIL_S3_PATH_STYLE")?
                    .unwrap_or(storage.path_style),
            },
            metacache: MetaCacheSettings {
                backend: lookup("THUMBNAIL_METACACHE").unwrap_or(metacache.backend),
                redis_url: lookup("REDIS_URL").unwrap_or(metacache.redis_url),
                ttl_secs: metacache_ttl,
                reverse_index: parse_var::<bool>(&lookup, "THUMBNAIL_REVERSE_INDEX")?
                    .unwrap_or(metacache.reverse_index),
            },
        })
    }

    pub fn url_timeout(&self) -> Option<Duration> {
        self.url_timeout_secs.map(Duration::from_secs)
    }

    /// Lenient mode silences source and transform errors
    pub fn is_lenient(&self) -> bool {
        !self.debug
    }
}

impl MetaCacheSettings {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ThumbnailError::Configuration(format!("invalid {}='{}': {}", name, raw, e))
        }),
    }
}
