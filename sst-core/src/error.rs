//! Error types for the Storage Sync Toolkit

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias
pub type SstResult<T> = Result<T, SstError>;

/// Backend call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Put,
    Get,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::List => "list",
            Operation::Put => "put",
            Operation::Get => "get",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A failed backend call against one record
#[derive(Error, Debug)]
#[error("{operation} of {record} on {backend} failed: {cause}")]
pub struct TransferError {
    pub backend: String,
    pub operation: Operation,
    pub record: String,
    #[source]
    pub cause: Box<SstError>,
}

impl TransferError {
    pub fn new(
        backend: impl Into<String>,
        operation: Operation,
        record: impl Into<String>,
        cause: impl Into<SstError>,
    ) -> Self {
        Self {
            backend: backend.into(),
            operation,
            record: record.into(),
            cause: Box::new(cause.into()),
        }
    }
}

/// Failure fetching a remote sample asset
#[derive(Error, Debug, Clone)]
#[error("download of {url} failed: {message}")]
pub struct DownloadError {
    pub url: String,
    pub status: Option<u16>,
    pub message: String,
}

/// Main error type
#[derive(Error, Debug)]
pub enum SstError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Object of {size} bytes exceeds the {limit} byte limit")]
    SizeLimitExceeded { size: u64, limit: u64 },

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider API error ({provider}): {message}")]
    ProviderApi { provider: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an error, used in per-file outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    BucketNotFound,
    SizeLimit,
    ChecksumMismatch,
    Download,
    InvalidLocation,
    Config,
    Io,
    Network,
    ProviderApi,
    Other,
}

impl SstError {
    /// Classify the error, looking through transfer wrappers to the root cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SstError::Transfer(t) => t.cause.kind(),
            SstError::NotFound(_) => ErrorKind::NotFound,
            SstError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            SstError::BucketNotFound(_) => ErrorKind::BucketNotFound,
            SstError::SizeLimitExceeded { .. } => ErrorKind::SizeLimit,
            SstError::ChecksumMismatch => ErrorKind::ChecksumMismatch,
            SstError::Download(_) => ErrorKind::Download,
            SstError::InvalidLocation(_) => ErrorKind::InvalidLocation,
            SstError::Config(_) => ErrorKind::Config,
            SstError::Io(_) => ErrorKind::Io,
            SstError::Network(_) => ErrorKind::Network,
            SstError::ProviderApi { .. } => ErrorKind::ProviderApi,
            SstError::Other(_) => ErrorKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Download)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_looks_through_transfer() {
        let err: SstError = TransferError::new(
            "filesystem",
            Operation::Delete,
            "/data/a.tif",
            SstError::NotFound("/data/a.tif".into()),
        )
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_not_found_classified() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SstError = io_err.into();
        assert!(matches!(err, SstError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_is_retryable() {
        assert!(SstError::Network("connection reset".into()).is_retryable());
        assert!(!SstError::BucketNotFound("bandicoot".into()).is_retryable());
        assert!(!SstError::SizeLimitExceeded { size: 10, limit: 5 }.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = TransferError::new(
            "s3",
            Operation::Put,
            "example/a.tif",
            SstError::SizeLimitExceeded { size: 8, limit: 4 },
        );
        assert_eq!(
            err.to_string(),
            "put of example/a.tif on s3 failed: Object of 8 bytes exceeds the 4 byte limit"
        );

        let err = SstError::BucketNotFound("bandicoot".into());
        assert_eq!(format!("{}", err), "Bucket not found: bandicoot");
    }
}
