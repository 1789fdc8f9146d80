//! Object-store backend
//!
//! The backend speaks to any S3-like service through [`ObjectClient`], which
//! carries both the control-plane call (bucket pre-flight) and the data-plane
//! calls (paged listing, put, get, remove).

use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, stream, Stream, TryStreamExt};
use sst_core::{
    backend::{Backend, RecordStream},
    error::{Operation, SstError, SstResult, TransferError},
    filter::FileFilter,
    location::Location,
    record::{DirectoryMarker, FileRecord, ListedEntry},
};
use std::sync::Arc;

pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// One object as reported by a listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

/// One page of a recursive listing
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectInfo>,
    /// Token for the next page; `None` on the last page
    pub next_continuation: Option<String>,
}

/// Wire-level client for an S3-compatible service.
///
/// Clients return raw causes (`NotFound`, `BucketNotFound`, `Network`, ...);
/// the backend wraps them into transfer errors.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    fn name(&self) -> &str;

    async fn bucket_exists(&self, bucket: &str) -> SstResult<bool>;

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> SstResult<ObjectPage>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> SstResult<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> SstResult<Bytes>;

    /// Removing an absent key is not an error.
    async fn remove_object(&self, bucket: &str, key: &str) -> SstResult<()>;
}

/// Backend bound to a bucket and prefix
pub struct ObjectStoreBackend {
    id: String,
    location: Location,
    bucket: String,
    prefix: String,
    client: Arc<dyn ObjectClient>,
    size_limit: Option<u64>,
}

impl ObjectStoreBackend {
    pub fn new(client: Arc<dyn ObjectClient>, location: &Location) -> SstResult<Self> {
        let (bucket, prefix) = match location {
            Location::ObjectStore { bucket, prefix } => (bucket.clone(), prefix.clone()),
            Location::Filesystem { .. } => {
                return Err(SstError::InvalidLocation(format!(
                    "{} is not an object-store location",
                    location
                )))
            }
        };
        Ok(Self {
            id: client.name().to_string(),
            location: location.clone(),
            bucket,
            prefix,
            client,
            size_limit: None,
        })
    }

    /// Reject puts larger than `limit` bytes
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = Some(limit);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn transfer_error(
        &self,
        operation: Operation,
        record: &str,
        cause: impl Into<SstError>,
    ) -> SstError {
        TransferError::new(&self.id, operation, record, cause).into()
    }

    /// Zero-length object at the prefix, the object-store stand-in for mkdir.
    pub async fn create_directory_marker(&self) -> SstResult<DirectoryMarker> {
        if self.prefix.is_empty() {
            return Err(SstError::InvalidLocation(format!(
                "{} is a bucket root; no directory marker needed",
                self.location
            )));
        }

        self.client
            .put_object(&self.bucket, &self.prefix, Bytes::new(), Some(DIRECTORY_CONTENT_TYPE))
            .await
            .map_err(|e| self.transfer_error(Operation::Put, &self.prefix, e))?;

        tracing::info!(bucket = %self.bucket, key = %self.prefix, "Directory marker created");
        Ok(DirectoryMarker {
            key: self.prefix.clone(),
        })
    }

    /// Pages of a recursive listing, fetched on demand.
    fn pages(&self) -> impl Stream<Item = SstResult<ObjectPage>> + Send + 'static {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let prefix = self.prefix.clone();
        let backend = self.id.clone();
        let record = self.location.to_string();

        // State: Some(token) = fetch a page, None = done.
        stream::try_unfold(Some(None::<String>), move |state| {
            let client = client.clone();
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            let backend = backend.clone();
            let record = record.clone();
            async move {
                let Some(token) = state else {
                    return Ok(None);
                };
                let page = client
                    .list_page(&bucket, &prefix, token)
                    .await
                    .map_err(|e| {
                        SstError::from(TransferError::new(backend, Operation::List, record, e))
                    })?;
                let next = page.next_continuation.clone().map(Some);
                Ok::<_, SstError>(Some((page, next)))
            }
        })
    }

    fn objects(&self) -> impl Stream<Item = SstResult<ObjectInfo>> + Send + 'static {
        self.pages()
            .map_ok(|page| stream::iter(page.objects.into_iter().map(Ok)))
            .try_flatten()
    }

    fn classify(location: &Location, object: ObjectInfo) -> ListedEntry {
        if DirectoryMarker::is_marker(&object.key, object.size) {
            return ListedEntry::DirectoryMarker(DirectoryMarker { key: object.key });
        }
        let relative = location
            .relative_key(&object.key)
            .unwrap_or(&object.key)
            .to_string();
        ListedEntry::File(FileRecord::new(relative, object.size, object.key))
    }
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> &Location {
        &self.location
    }

    /// Fails fast with `BucketNotFound` when the bucket is absent.
    async fn prepare(&self) -> SstResult<()> {
        let exists = self
            .client
            .bucket_exists(&self.bucket)
            .await
            .map_err(|e| self.transfer_error(Operation::List, &self.bucket, e))?;
        if !exists {
            return Err(SstError::BucketNotFound(self.bucket.clone()));
        }
        tracing::debug!(bucket = %self.bucket, "Found the bucket");
        Ok(())
    }

    async fn list(&self, filter: &FileFilter) -> SstResult<RecordStream> {
        let location = self.location.clone();
        let filter = filter.clone();

        let records = self.objects().try_filter_map(move |object| {
            let record = match Self::classify(&location, object) {
                ListedEntry::File(record)
                    if !record.relative_name.is_empty() && filter.matches(&record.relative_name) =>
                {
                    Some(record)
                }
                _ => None,
            };
            future::ready(Ok(record))
        });

        Ok(Box::pin(records))
    }

    async fn list_raw(&self) -> SstResult<Vec<ListedEntry>> {
        let location = self.location.clone();
        self.objects()
            .map_ok(move |object| Self::classify(&location, object))
            .try_collect()
            .await
    }

    async fn put(&self, data: Bytes, record: &FileRecord) -> SstResult<FileRecord> {
        let name = record.relative_name.trim_start_matches('/');
        let key = self
            .location
            .object_key(name)
            .ok_or_else(|| SstError::InvalidLocation(self.location.to_string()))?;
        let size = data.len() as u64;

        if let Some(limit) = self.size_limit {
            if size > limit {
                return Err(self.transfer_error(
                    Operation::Put,
                    &key,
                    SstError::SizeLimitExceeded { size, limit },
                ));
            }
        }

        let start = std::time::Instant::now();
        self.client
            .put_object(&self.bucket, &key, data, None)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object put failed"
                );
                self.transfer_error(Operation::Put, &key, e)
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object put successful"
        );

        Ok(FileRecord::new(name, size, key))
    }

    async fn get(&self, record: &FileRecord) -> SstResult<Bytes> {
        let key = &record.backend_identifier;
        let start = std::time::Instant::now();
        let data = self
            .client
            .get_object(&self.bucket, key)
            .await
            .map_err(|e| self.transfer_error(Operation::Get, key, e))?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object get successful"
        );
        Ok(data)
    }

    /// Idempotent: an absent object counts as deleted.
    async fn delete(&self, record: &FileRecord) -> SstResult<()> {
        let key = &record.backend_identifier;
        match self.client.remove_object(&self.bucket, key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(bucket = %self.bucket, key = %key, "Object already absent");
            }
            Err(e) => return Err(self.transfer_error(Operation::Delete, key, e)),
        }

        tracing::info!(bucket = %self.bucket, key = %key, "Object delete successful");
        Ok(())
    }
}
