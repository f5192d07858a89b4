//! Source identifiers and the fetch capability
//!
//! Remote sources (`http://`, `https://`) are fetched over HTTP with a
//! timeout and a client identifier header; everything else is read from a
//! storage backend.

use crate::error::{SourceError, StorageError, ValidationError};
use crate::keys::DELIMITER;
use crate::storage::StorageBackend;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Client identifier sent with remote fetches
pub const USER_AGENT: &str = concat!("thumbnail-core/", env!("CARGO_PKG_VERSION"));

/// Immutable identifier of an original image: a storage key or a URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef(String);

impl SourceRef {
    /// Validate and normalize; exactly one trailing `/` is removed
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.contains(DELIMITER) {
            return Err(ValidationError::BadSource(
                "contains a reserved control character".to_string(),
            ));
        }
        let normalized = raw.strip_suffix('/').unwrap_or(raw);
        if normalized.is_empty() {
            return Err(ValidationError::BadSource("empty source".to_string()));
        }
        Ok(Self(normalized.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_remote(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source fetch capability
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &SourceRef) -> Result<Bytes, SourceError>;
}

/// HTTP GET with a caller-configured timeout
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self, SourceError> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn classify(source: &SourceRef, err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout(source.to_string())
    } else {
        SourceError::Network(format!("{source}: {err}"))
    }
}

#[async_trait::async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &SourceRef) -> Result<Bytes, SourceError> {
        let response = self
            .client
            .get(source.as_str())
            .send()
            .await
            .map_err(|e| classify(source, e))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(SourceError::NotFound(source.to_string()))
            }
            status => {
                return Err(SourceError::Network(format!(
                    "{source}: unexpected status {status}"
                )))
            }
        }

        let body = response.bytes().await.map_err(|e| classify(source, e))?;
        debug!(source = %source, size = body.len(), "Fetched remote source");
        Ok(body)
    }
}

/// Reads sources stored in a storage backend
#[derive(Clone)]
pub struct StorageFetcher {
    storage: Arc<dyn StorageBackend>,
}

impl StorageFetcher {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}

#[async_trait::async_trait]
impl SourceFetcher for StorageFetcher {
    async fn fetch(&self, source: &SourceRef) -> Result<Bytes, SourceError> {
        self.storage
            .read(source.as_str())
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) | StorageError::InvalidKey(_) => {
                    SourceError::NotFound(source.to_string())
                }
                other => SourceError::Storage(other.to_string()),
            })
    }
}

/// Routes remote sources to HTTP and the rest to storage
#[derive(Clone)]
pub struct SourceRouter {
    remote: Arc<dyn SourceFetcher>,
    local: Arc<dyn SourceFetcher>,
}

impl SourceRouter {
    pub fn new(remote: Arc<dyn SourceFetcher>, local: Arc<dyn SourceFetcher>) -> Self {
        Self { remote, local }
    }
}

#[async_trait::async_trait]
impl SourceFetcher for SourceRouter {
    async fn fetch(&self, source: &SourceRef) -> Result<Bytes, SourceError> {
        if source.is_remote() {
            self.remote.fetch(source).await
        } else {
            self.local.fetch(source).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_source_normalization() {
        assert_eq!(SourceRef::parse("photos/pic.jpg").unwrap().as_str(), "photos/pic.jpg");
        assert_eq!(SourceRef::parse("photos/dir/").unwrap().as_str(), "photos/dir");
        // Only one trailing slash is stripped
        assert_eq!(SourceRef::parse("photos//").unwrap().as_str(), "photos/");
        // Case is preserved
        assert_eq!(SourceRef::parse("Pic.JPG").unwrap().as_str(), "Pic.JPG");
    }

    #[test]
    fn test_source_rejects_invalid() {
        assert!(SourceRef::parse("").is_err());
        assert!(SourceRef::parse("/").is_err());
        assert!(SourceRef::parse("a\u{1f}b").is_err());
    }

    #[test]
    fn test_is_remote() {
        assert!(SourceRef::parse("https://example.com/a.jpg").unwrap().is_remote());
        assert!(SourceRef::parse("http://example.com/a.jpg").unwrap().is_remote());
        assert!(!SourceRef::parse("ftp/a.jpg").unwrap().is_remote());
    }

    #[tokio::test]
    async fn test_storage_fetcher_not_found() {
        let fetcher = StorageFetcher::new(Arc::new(MemoryStorage::new("/media")));
        let source = SourceRef::parse("missing.jpg").unwrap();
        assert!(matches!(
            fetcher.fetch(&source).await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_router_uses_local_for_keys() {
        let storage = MemoryStorage::new("/media");
        storage
            .write("pic.jpg", Bytes::from_static(b"bytes"))
            .await
            .unwrap();
        let local: Arc<dyn SourceFetcher> = Arc::new(StorageFetcher::new(Arc::new(storage)));
        let remote: Arc<dyn SourceFetcher> = Arc::new(HttpFetcher::new(None).unwrap());
        let router = SourceRouter::new(remote, local);

        let data = router
            .fetch(&SourceRef::parse("pic.jpg").unwrap())
            .await
            .unwrap();
        assert_eq!(data, Bytes::from_static(b"bytes"));
    }
}
