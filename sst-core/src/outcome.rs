//! Per-file transfer outcomes

use crate::error::{ErrorKind, SstError};
use crate::location::LocationKind;
use crate::record::FileRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a transfer relative to the local side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
    Delete,
}

impl Direction {
    /// Object store to filesystem is a download; everything else is an upload.
    pub fn between(source: LocationKind, destination: LocationKind) -> Self {
        match (source, destination) {
            (LocationKind::ObjectStore, LocationKind::Filesystem) => Direction::Download,
            _ => Direction::Upload,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Upload => "upload",
            Direction::Download => "download",
            Direction::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Why a transfer failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SstError> for FailureReason {
    fn from(err: &SstError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TransferStatus {
    Success,
    Failed(FailureReason),
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Success => f.write_str("success"),
            TransferStatus::Failed(reason) => write!(f, "failed: {}", reason.message),
        }
    }
}

/// Result of attempting one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Record that was attempted
    pub file: FileRecord,
    pub status: TransferStatus,
    pub direction: Direction,
    /// Identifier written at the destination, on success
    pub target: Option<String>,
}

impl TransferOutcome {
    pub fn success(file: FileRecord, direction: Direction, target: Option<String>) -> Self {
        Self {
            file,
            status: TransferStatus::Success,
            direction,
            target,
        }
    }

    pub fn failed(file: FileRecord, direction: Direction, err: &SstError) -> Self {
        Self {
            file,
            status: TransferStatus::Failed(err.into()),
            direction,
            target: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.status {
            TransferStatus::Success => None,
            TransferStatus::Failed(reason) => Some(reason.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Operation, TransferError};

    #[test]
    fn test_direction_between() {
        use LocationKind::*;
        assert_eq!(Direction::between(Filesystem, ObjectStore), Direction::Upload);
        assert_eq!(Direction::between(ObjectStore, Filesystem), Direction::Download);
        assert_eq!(Direction::between(Filesystem, Filesystem), Direction::Upload);
        assert_eq!(Direction::between(ObjectStore, ObjectStore), Direction::Upload);
    }

    #[test]
    fn test_failed_outcome_keeps_root_kind() {
        let record = FileRecord::new("a.tif", 4, "/data/a.tif");
        let err: SstError = TransferError::new(
            "filesystem",
            Operation::Delete,
            "/data/a.tif",
            SstError::NotFound("/data/a.tif".into()),
        )
        .into();
        let outcome = TransferOutcome::failed(record, Direction::Delete, &err);
        assert!(!outcome.is_success());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::NotFound));
        assert!(outcome.status.to_string().starts_with("failed: delete of /data/a.tif"));
    }
}
