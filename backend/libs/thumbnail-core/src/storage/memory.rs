//! In-process storage backed by a concurrent map

use super::{join_url, StorageBackend};
use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

/// Volatile storage; clones share the same objects
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<DashMap<String, Bytes>>,
    base_url: String,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: Arc::new(DashMap::new()),
            base_url: base_url.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn url(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_is_immediately_visible() {
        let storage = MemoryStorage::new("/media");
        assert!(!storage.exists("a.jpg").await.unwrap());

        storage.write("a.jpg", Bytes::from_static(b"one")).await.unwrap();
        assert!(storage.exists("a.jpg").await.unwrap());
        assert_eq!(storage.read("a.jpg").await.unwrap(), Bytes::from_static(b"one"));

        storage.write("a.jpg", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(storage.read("a.jpg").await.unwrap(), Bytes::from_static(b"two"));
    }

    #[tokio::test]
    async fn test_missing_objects() {
        let storage = MemoryStorage::new("/media");
        assert!(matches!(
            storage.read("missing.jpg").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.delete("missing.jpg").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
