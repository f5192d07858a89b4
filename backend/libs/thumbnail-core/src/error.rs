//! Error types for thumbnail generation
//!
//! Validation errors are caller mistakes and always propagate. Source and
//! transform errors may be silenced by a lenient engine. Storage errors always
//! propagate; cache errors are tolerated by the engine and only logged.

use thiserror::Error;

/// Result type for thumbnail operations
pub type Result<T> = std::result::Result<T, ThumbnailError>;

/// Malformed geometry, options or source identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Bad value for option '{option}': {reason}")]
    BadValue { option: String, reason: String },

    #[error("Invalid geometry '{0}'")]
    BadGeometry(String),

    #[error("Invalid source: {0}")]
    BadSource(String),
}

impl ValidationError {
    pub(crate) fn bad_value(option: &str, reason: impl Into<String>) -> Self {
        ValidationError::BadValue {
            option: option.to_string(),
            reason: reason.into(),
        }
    }
}

/// Source image could not be fetched
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Network error fetching source: {0}")]
    Network(String),

    #[error("Timed out fetching source: {0}")]
    Timeout(String),

    #[error("Storage error reading source: {0}")]
    Storage(String),
}

/// The transform capability failed
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Transform task failed: {0}")]
    Task(String),
}

/// Storage backend failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Metadata store failures
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Top-level error returned by the engine
#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ThumbnailError {
    /// Errors that a lenient engine turns into an empty result
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ThumbnailError::Source(_) | ThumbnailError::Transform(_))
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ThumbnailError::Validation(_) => "validation",
            ThumbnailError::Source(_) => "source",
            ThumbnailError::Transform(_) => "transform",
            ThumbnailError::Storage(_) => "storage",
            ThumbnailError::Cache(_) => "cache",
            ThumbnailError::Configuration(_) => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ValidationError::UnknownOption("invalid".to_string());
        assert_eq!(err.to_string(), "Unknown option: invalid");

        let err = ValidationError::bad_value("quality", "expected an integer");
        assert_eq!(
            err.to_string(),
            "Bad value for option 'quality': expected an integer"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        let err: ThumbnailError = SourceError::NotFound("pic.jpg".into()).into();
        assert!(err.is_recoverable());

        let err: ThumbnailError = TransformError::Decode("bad header".into()).into();
        assert!(err.is_recoverable());

        let err: ThumbnailError = ValidationError::BadGeometry("240xABC".into()).into();
        assert!(!err.is_recoverable());

        let err: ThumbnailError = StorageError::Backend("disk full".into()).into();
        assert!(!err.is_recoverable());
        assert_eq!(err.kind(), "storage");
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<String>("invalid json").unwrap_err();
        let err: CacheError = json_err.into();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
