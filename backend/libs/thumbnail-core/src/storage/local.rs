//! Local filesystem storage
//!
//! Writes go to a uniquely named temp file next to the target and are then
//! renamed over it, so concurrent writers resolve to last-writer-wins and
//! readers only ever see complete files.

use super::{join_url, StorageBackend};
use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key below the root, rejecting anything that could escape it
    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let invalid = || StorageError::InvalidKey(key.to_string());

        if key.is_empty() || key.starts_with('/') || key.contains('\\') {
            return Err(invalid());
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid());
        }

        Ok(self.root.join(key))
    }
}

fn not_found_or(key: &str, err: std::io::Error) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.path_for(key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| not_found_or(key, e))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        tokio::fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("object");
        let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::Io(e));
        }

        debug!(key = %key, size = data.len(), "Stored object on local filesystem");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or(key, e))
    }

    fn url(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }
}
