//! Storage backend trait

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

use crate::{
    error::SstResult,
    filter::FileFilter,
    location::{Location, LocationKind},
    record::{FileRecord, ListedEntry},
};

/// Lazily produced listing
pub type RecordStream = Pin<Box<dyn Stream<Item = SstResult<FileRecord>> + Send>>;

/// A storage technology adapter bound to one location.
///
/// Implementations hold a single session (a root path or an HTTP client)
/// that is reused across calls. Every failing call returns an
/// [`SstError::Transfer`](crate::SstError::Transfer) naming the backend,
/// operation and record.
#[async_trait]
pub trait Backend: Send + Sync {
    fn id(&self) -> &str;
    fn location(&self) -> &Location;

    fn kind(&self) -> LocationKind {
        self.location().kind()
    }

    /// Make the location usable: idempotent mkdir, or bucket pre-flight.
    async fn prepare(&self) -> SstResult<()>;

    /// Transferable records matching `filter`. Directory markers are excluded.
    async fn list(&self, filter: &FileFilter) -> SstResult<RecordStream>;

    /// Every entry under the location, directory markers included.
    async fn list_raw(&self) -> SstResult<Vec<ListedEntry>>;

    /// Store `data` under `record.relative_name`, returning the written record.
    async fn put(&self, data: Bytes, record: &FileRecord) -> SstResult<FileRecord>;

    async fn get(&self, record: &FileRecord) -> SstResult<Bytes>;

    async fn delete(&self, record: &FileRecord) -> SstResult<()>;

    /// Drain [`Backend::list`] into a vector.
    async fn list_all(&self, filter: &FileFilter) -> SstResult<Vec<FileRecord>> {
        self.list(filter).await?.try_collect().await
    }
}
