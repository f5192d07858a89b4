//! S3 object storage
//!
//! `put_object` replaces objects atomically, so the atomic-replace contract
//! holds without temp objects.

use super::{content_type_for, join_url, StorageBackend};
use crate::error::{StorageError, StorageResult};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3StorageConfig {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region; falls back to the environment when unset
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,
    /// Public base URL (CDN domain); when empty URLs point at the bucket
    pub base_url: String,
    /// Whether to use path-style URLs (false = virtual-hosted-style)
    pub path_style: bool,
}

#[derive(Clone)]
pub struct S3Storage {
    client: Arc<Client>,
    config: S3StorageConfig,
}

impl S3Storage {
    /// Create a storage backend from an existing client
    pub fn new(client: Arc<Client>, config: S3StorageConfig) -> Self {
        Self { client, config }
    }

    /// Create a storage backend, loading AWS credentials from the environment
    pub async fn from_config(config: S3StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        info!(bucket = %config.bucket, "S3 storage initialized");
        Self::new(Arc::new(Client::from_conf(builder.build())), config)
    }

    pub fn config(&self) -> &S3StorageConfig {
        &self.config
    }

    /// Direct bucket URL for an object
    fn object_url(&self, key: &str) -> String {
        if self.config.path_style {
            let endpoint = self
                .config
                .endpoint
                .as_deref()
                .unwrap_or("https://s3.amazonaws.com");
            join_url(&join_url(endpoint, &self.config.bucket), key)
        } else {
            format!("https://{}.s3.amazonaws.com/{}", self.config.bucket, key)
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(StorageError::Backend(format!("head_object {key}: {e}")))
                }
            }
        }
    }

    async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Backend(format!("get_object {key}: {e}"))
                }
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("read body {key}: {e}")))?;
        Ok(body.into_bytes())
    }

    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(content_type_for(key))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("put_object {key}: {e}")))?;

        debug!(bucket = %self.config.bucket, key = %key, size, "Stored object in S3");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        // S3 deletes are idempotent; check first to report missing objects
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("delete_object {key}: {e}")))?;
        Ok(())
    }

    fn url(&self, key: &str) -> String {
        if self.config.base_url.is_empty() {
            self.object_url(key)
        } else {
            join_url(&self.config.base_url, key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(base_url: &str, path_style: bool) -> S3Storage {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        S3Storage::new(
            Arc::new(Client::from_conf(conf)),
            S3StorageConfig {
                bucket: "test-bucket".to_string(),
                region: Some("us-east-1".to_string()),
                endpoint: None,
                base_url: base_url.to_string(),
                path_style,
            },
        )
    }

    #[test]
    fn test_url_virtual_hosted_style() {
        let url = storage("", false).url("test/image.jpg");
        assert_eq!(url, "https://test-bucket.s3.amazonaws.com/test/image.jpg");
    }

    #[test]
    fn test_url_path_style() {
        let url = storage("", true).url("test/image.jpg");
        assert_eq!(url, "https://s3.amazonaws.com/test-bucket/test/image.jpg");
    }

    #[test]
    fn test_url_cdn() {
        let url = storage("https://cdn.example.com/", false).url("test/image.jpg");
        assert_eq!(url, "https://cdn.example.com/test/image.jpg");
    }
}
