//! Listed records and directory markers

use serde::{Deserialize, Serialize};

/// Metadata identifying one storable file or object.
///
/// `backend_identifier` is a full path for filesystem backends or an object
/// key for object-store backends. `relative_name` always uses `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    pub relative_name: String,
    pub size_bytes: u64,
    pub backend_identifier: String,
}

impl FileRecord {
    pub fn new(
        relative_name: impl Into<String>,
        size_bytes: u64,
        backend_identifier: impl Into<String>,
    ) -> Self {
        Self {
            relative_name: relative_name.into(),
            size_bytes,
            backend_identifier: backend_identifier.into(),
        }
    }

    /// Final path segment of the relative name
    pub fn file_name(&self) -> &str {
        self.relative_name
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(&self.relative_name)
    }
}

/// Zero-length object whose key ends in `/`, emulating a folder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectoryMarker {
    pub key: String,
}

impl DirectoryMarker {
    pub fn is_marker(key: &str, size: u64) -> bool {
        size == 0 && key.ends_with('/')
    }
}

/// One entry of a raw listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListedEntry {
    File(FileRecord),
    DirectoryMarker(DirectoryMarker),
}

impl ListedEntry {
    pub fn identifier(&self) -> &str {
        match self {
            ListedEntry::File(record) => &record.backend_identifier,
            ListedEntry::DirectoryMarker(marker) => &marker.key,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            ListedEntry::File(record) => record.size_bytes,
            ListedEntry::DirectoryMarker(_) => 0,
        }
    }

    pub fn is_directory_marker(&self) -> bool {
        matches!(self, ListedEntry::DirectoryMarker(_))
    }

    pub fn into_file(self) -> Option<FileRecord> {
        match self {
            ListedEntry::File(record) => Some(record),
            ListedEntry::DirectoryMarker(_) => None,
        }
    }
}
