//! Backend registry
//!
//! Maps configuration names to backend constructors.

use crate::config::{MetaCacheSettings, StorageSettings};
use crate::error::{Result, ThumbnailError};
use crate::metacache::{MemoryMetaStore, MetaStore, RedisMetaStore};
use crate::storage::{LocalStorage, MemoryStorage, S3Storage, S3StorageConfig, StorageBackend};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    S3,
    Memory,
}

impl FromStr for StorageKind {
    type Err = ThumbnailError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "filesystem" | "fs" => Ok(StorageKind::Local),
            "s3" => Ok(StorageKind::S3),
            "memory" => Ok(StorageKind::Memory),
            other => Err(ThumbnailError::Configuration(format!(
                "unknown storage backend '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCacheKind {
    Memory,
    Redis,
}

impl FromStr for MetaCacheKind {
    type Err = ThumbnailError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "local" => Ok(MetaCacheKind::Memory),
            "redis" => Ok(MetaCacheKind::Redis),
            other => Err(ThumbnailError::Configuration(format!(
                "unknown metacache backend '{}'",
                other
            ))),
        }
    }
}

/// Build the configured storage backend
pub async fn build_storage(settings: &StorageSettings) -> Result<Arc<dyn StorageBackend>> {
    let storage: Arc<dyn StorageBackend> = match settings.backend.parse::<StorageKind>()? {
        StorageKind::Local => Arc::new(LocalStorage::new(&settings.root, settings.base_url.clone())),
        StorageKind::Memory => Arc::new(MemoryStorage::new(settings.base_url.clone())),
        StorageKind::S3 => Arc::new(
            S3Storage::from_config(S3StorageConfig {
                bucket: settings.bucket.clone(),
                region: settings.region.clone(),
                endpoint: settings.endpoint.clone(),
                base_url: settings.base_url.clone(),
                path_style: settings.path_style,
            })
            .await,
        ),
    };
    Ok(storage)
}

/// Build the configured metadata store
pub async fn build_meta_store(settings: &MetaCacheSettings) -> Result<Arc<dyn MetaStore>> {
    let store: Arc<dyn MetaStore> = match settings.backend.parse::<MetaCacheKind>()? {
        MetaCacheKind::Memory => Arc::new(MemoryMetaStore::new()),
        MetaCacheKind::Redis => Arc::new(RedisMetaStore::connect(&settings.redis_url).await?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind() {
        assert_eq!("local".parse::<StorageKind>().unwrap(), StorageKind::Local);
        assert_eq!("FileSystem".parse::<StorageKind>().unwrap(), StorageKind::Local);
        assert_eq!("s3".parse::<StorageKind>().unwrap(), StorageKind::S3);
        assert_eq!("memory".parse::<StorageKind>().unwrap(), StorageKind::Memory);
        assert!("ftp".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_metacache_kind() {
        assert_eq!("memory".parse::<MetaCacheKind>().unwrap(), MetaCacheKind::Memory);
        assert_eq!("Redis".parse::<MetaCacheKind>().unwrap(), MetaCacheKind::Redis);
        assert!("memcached".parse::<MetaCacheKind>().is_err());
    }

    #[tokio::test]
    async fn test_build_memory_backends() {
        let storage = build_storage(&StorageSettings {
            backend: "memory".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(storage.name(), "memory");
        assert_eq!(storage.url("a.jpg"), "/media/a.jpg");

        let store = build_meta_store(&MetaCacheSettings::default()).await.unwrap();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_build_local_storage() {
        let storage = build_storage(&StorageSettings::default()).await.unwrap();
        assert_eq!(storage.name(), "local");
    }
}
