//! Local filesystem backend
//!
//! Covers both plain local directories and remote shares mounted into the
//! local tree.

use async_trait::async_trait;
use bytes::Bytes;
use sst_core::{
    backend::{Backend, RecordStream},
    error::{Operation, SstError, SstResult, TransferError},
    filter::FileFilter,
    location::Location,
    record::{FileRecord, ListedEntry},
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

/// Local filesystem backend
pub struct FilesystemBackend {
    id: String,
    location: Location,
    root: PathBuf,
    size_limit: Option<u64>,
}

impl FilesystemBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            id: "filesystem".to_string(),
            location: Location::filesystem(&root),
            root,
            size_limit: None,
        }
    }

    pub fn from_location(location: &Location) -> SstResult<Self> {
        match location {
            Location::Filesystem { root } => Ok(Self::new(root)),
            Location::ObjectStore { .. } => Err(SstError::InvalidLocation(format!(
                "{} is not a filesystem location",
                location
            ))),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Reject puts larger than `limit` bytes
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = Some(limit);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn transfer_error(
        &self,
        operation: Operation,
        record: &str,
        cause: impl Into<SstError>,
    ) -> SstError {
        TransferError::new(&self.id, operation, record, cause).into()
    }

    /// Resolve a relative name below the root, refusing traversal.
    fn target_path(&self, relative_name: &str) -> SstResult<PathBuf> {
        let escapes = relative_name
            .split('/')
            .any(|seg| seg == ".." || seg.contains('\\'));
        if escapes || relative_name.trim_matches('/').is_empty() {
            return Err(SstError::InvalidLocation(format!(
                "relative name {:?} does not resolve below {}",
                relative_name,
                self.root.display()
            )));
        }
        self.location
            .file_path(relative_name)
            .ok_or_else(|| SstError::InvalidLocation(relative_name.to_string()))
    }

    fn walk(root: &Path, filter: &FileFilter) -> SstResult<Vec<FileRecord>> {
        if !root.is_dir() {
            return Err(SstError::NotFound(root.display().to_string()));
        }

        let mut records = Vec::new();
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|_| SstError::InvalidLocation(entry.path().display().to_string()))?;
            let segments: Option<Vec<&str>> =
                relative.components().map(|c| c.as_os_str().to_str()).collect();
            let (Some(segments), Some(identifier)) = (segments, entry.path().to_str()) else {
                tracing::warn!(path = %entry.path().display(), "Skipping file with a non UTF-8 name");
                continue;
            };
            let relative_name = segments.join("/");

            if !filter.matches(&relative_name) {
                continue;
            }

            let size = entry.metadata().map_err(std::io::Error::from)?.len();
            records.push(FileRecord::new(relative_name, size, identifier));
        }
        Ok(records)
    }

    async fn walk_blocking(&self, filter: FileFilter) -> SstResult<Vec<FileRecord>> {
        let root = self.root.clone();
        let records = tokio::task::spawn_blocking(move || Self::walk(&root, &filter))
            .await
            .map_err(|e| SstError::Other(format!("directory walk panicked: {}", e)))?;
        records.map_err(|e| {
            self.transfer_error(Operation::List, &self.root.display().to_string(), e)
        })
    }
}

#[async_trait]
impl Backend for FilesystemBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> &Location {
        &self.location
    }

    async fn prepare(&self) -> SstResult<()> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            self.transfer_error(Operation::Put, &self.root.display().to_string(), e)
        })?;
        tracing::debug!(path = %self.root.display(), "Filesystem location ready");
        Ok(())
    }

    async fn list(&self, filter: &FileFilter) -> SstResult<RecordStream> {
        let start = std::time::Instant::now();
        let records = self.walk_blocking(filter.clone()).await?;

        tracing::debug!(
            path = %self.root.display(),
            pattern = %filter.pattern(),
            count = records.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Filesystem listing complete"
        );

        Ok(Box::pin(futures::stream::iter(records.into_iter().map(Ok))))
    }

    async fn list_raw(&self) -> SstResult<Vec<ListedEntry>> {
        let records = self.walk_blocking(FileFilter::all()).await?;
        Ok(records.into_iter().map(ListedEntry::File).collect())
    }

    async fn put(&self, data: Bytes, record: &FileRecord) -> SstResult<FileRecord> {
        let name = &record.relative_name;
        let size = data.len() as u64;

        if let Some(limit) = self.size_limit {
            if size > limit {
                return Err(self.transfer_error(
                    Operation::Put,
                    name,
                    SstError::SizeLimitExceeded { size, limit },
                ));
            }
        }

        let path = self
            .target_path(name)
            .map_err(|e| self.transfer_error(Operation::Put, name, e))?;
        let identifier = path.display().to_string();
        let start = std::time::Instant::now();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.transfer_error(Operation::Put, &identifier, e))?;
        }

        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| self.transfer_error(Operation::Put, &identifier, e))?;
        file.write_all(&data)
            .await
            .map_err(|e| self.transfer_error(Operation::Put, &identifier, e))?;
        file.sync_all()
            .await
            .map_err(|e| self.transfer_error(Operation::Put, &identifier, e))?;

        tracing::info!(
            path = %identifier,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Filesystem put successful"
        );

        Ok(FileRecord::new(name.clone(), size, identifier))
    }

    async fn get(&self, record: &FileRecord) -> SstResult<Bytes> {
        let identifier = &record.backend_identifier;
        let data = fs::read(identifier).await.map_err(|e| {
            let cause = if e.kind() == std::io::ErrorKind::NotFound {
                SstError::NotFound(identifier.clone())
            } else {
                SstError::Io(e)
            };
            self.transfer_error(Operation::Get, identifier, cause)
        })?;

        tracing::debug!(path = %identifier, size_bytes = data.len(), "Filesystem get successful");
        Ok(Bytes::from(data))
    }

    /// Fails with `NotFound` when the file is already gone.
    async fn delete(&self, record: &FileRecord) -> SstResult<()> {
        let identifier = &record.backend_identifier;
        fs::remove_file(identifier).await.map_err(|e| {
            let cause = if e.kind() == std::io::ErrorKind::NotFound {
                SstError::NotFound(identifier.clone())
            } else {
                SstError::Io(e)
            };
            self.transfer_error(Operation::Delete, identifier, cause)
        })?;

        tracing::info!(path = %identifier, "Filesystem delete successful");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sst_core::ErrorKind;
    use tempfile::tempdir;

    fn write(root: &Path, name: &str, data: &[u8]) {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[tokio::test]
    async fn test_list_filters_by_pattern_recursively() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.tif", b"AAAA");
        write(dir.path(), "plate/b.tif", b"BB");
        write(dir.path(), "notes.txt", b"skip");

        let backend = FilesystemBackend::new(dir.path());
        let records = backend.list_all(&FileFilter::default()).await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.relative_name.as_str()).collect();
        assert_eq!(names, vec!["a.tif", "plate/b.tif"]);
        assert_eq!(records[1].size_bytes, 2);
        assert!(records[1].backend_identifier.ends_with("b.tif"));
    }

    // macOS refuses non UTF-8 names at the filesystem level
    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_list_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        write(dir.path(), "a.tif", b"AAAA");
        std::fs::write(dir.path().join(OsStr::from_bytes(b"img_\xff.tif")), b"BAD").unwrap();

        let backend = FilesystemBackend::new(dir.path());
        let records = backend.list_all(&FileFilter::all()).await.unwrap();
        let names: Vec<_> = records.iter().map(|r| r.relative_name.as_str()).collect();
        assert_eq!(names, vec!["a.tif"]);
        for record in &records {
            backend.get(record).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_list_missing_root() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("absent"));
        let err = backend.list(&FileFilter::default()).await.err().unwrap();
        assert!(matches!(err, SstError::Transfer(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        for (name, data) in [
            ("a.tif", &b"AAAA"[..]),
            ("empty.tif", &b""[..]),
            ("deep/x.tif", &b"a/b\\c"[..]),
        ] {
            let source = FileRecord::new(name, data.len() as u64, format!("src/{}", name));
            let written = backend.put(Bytes::copy_from_slice(data), &source).await.unwrap();
            assert_eq!(written.relative_name, name);
            assert_eq!(written.size_bytes, data.len() as u64);
            let read = backend.get(&written).await.unwrap();
            assert_eq!(&read[..], data);
        }
    }

    #[tokio::test]
    async fn test_delete_absent_is_not_found() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.tif", b"AAAA");
        let backend = FilesystemBackend::new(dir.path());
        let record = backend.list_all(&FileFilter::default()).await.unwrap().remove(0);

        backend.delete(&record).await.unwrap();
        let err = backend.delete(&record).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_size_limit() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).with_size_limit(3);
        let record = FileRecord::new("big.tif", 4, "src/big.tif");

        let err = backend.put(Bytes::from_static(b"AAAA"), &record).await.unwrap_err();
        assert!(matches!(err, SstError::Transfer(_)));
        assert_eq!(err.kind(), ErrorKind::SizeLimit);
        assert!(!dir.path().join("big.tif").exists());
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("root"));
        let record = FileRecord::new("../escape.tif", 1, "x");
        let err = backend.put(Bytes::from_static(b"x"), &record).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocation);
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("out/nested"));
        backend.prepare().await.unwrap();
        backend.prepare().await.unwrap();
        assert!(backend.root().is_dir());
    }

    #[tokio::test]
    async fn test_from_location_rejects_object_store() {
        let loc = Location::object_store("bandicoot", "example").unwrap();
        assert!(FilesystemBackend::from_location(&loc).is_err());
    }
}
