//! Byte-level storage for derivatives (and sources)
//!
//! Backends guarantee that a successful `write` is visible to `exists`/`read`
//! from the same process immediately, and that readers never observe a
//! partially written object.

mod local;
mod memory;
mod s3;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::{S3Storage, S3StorageConfig};

use crate::error::StorageResult;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Bytes escaped when a key becomes a URL path; `/` stays a separator
const URL_PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Storage backend contract consumed by the engine
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Check whether an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Read an object, `StorageError::NotFound` if absent
    async fn read(&self, key: &str) -> StorageResult<Bytes>;

    /// Write (or atomically replace) an object
    async fn write(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object, `StorageError::NotFound` if absent
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Public URL for serving the object
    fn url(&self, key: &str) -> String;
}

/// Join a base URL and a key with exactly one `/`; the key is URL-escaped
pub(crate) fn join_url(base_url: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        utf8_percent_encode(key.trim_start_matches('/'), URL_PATH_SET)
    )
}

/// Content type from a key's extension
pub(crate) fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
