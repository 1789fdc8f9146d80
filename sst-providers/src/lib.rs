//! Storage providers for the Storage Sync Toolkit
//!
//! Two backends: local (or mounted) filesystems and S3-compatible object
//! stores. Object stores are reached through an [`ObjectClient`], either the
//! signed HTTP client in [`s3`] or the in-process [`MemoryClient`].

pub mod fetch;
mod local;
mod memory;
mod object;
pub mod s3;

pub use fetch::{FetchReport, FetchedAsset, SampleFetcher};
pub use local::FilesystemBackend;
pub use memory::MemoryClient;
pub use object::{ObjectClient, ObjectInfo, ObjectPage, ObjectStoreBackend, DIRECTORY_CONTENT_TYPE};
pub use s3::{S3Client, S3Config};

use sst_core::{Backend, Location, SstError, SstResult};
use std::sync::Arc;

/// Opens backends for locations
///
/// Holds the shared object client so every object-store location opened by
/// one factory reuses the same connection pool.
#[derive(Clone, Default)]
pub struct BackendFactory {
    object_client: Option<Arc<dyn ObjectClient>>,
    size_limit: Option<u64>,
}

impl BackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object_client(mut self, client: Arc<dyn ObjectClient>) -> Self {
        self.object_client = Some(client);
        self
    }

    pub fn with_size_limit(mut self, limit: Option<u64>) -> Self {
        self.size_limit = limit;
        self
    }

    pub fn object_client(&self) -> Option<&Arc<dyn ObjectClient>> {
        self.object_client.as_ref()
    }

    pub fn open(&self, location: &Location) -> SstResult<Arc<dyn Backend>> {
        match location {
            Location::Filesystem { root } => {
                let mut backend = FilesystemBackend::new(root);
                if let Some(limit) = self.size_limit {
                    backend = backend.with_size_limit(limit);
                }
                Ok(Arc::new(backend))
            }
            Location::ObjectStore { .. } => {
                let backend = self.open_object_store(location)?;
                Ok(Arc::new(backend))
            }
        }
    }

    /// Concrete object-store backend, for calls outside the `Backend` trait
    /// such as directory markers.
    pub fn open_object_store(&self, location: &Location) -> SstResult<ObjectStoreBackend> {
        let client = self.object_client.clone().ok_or_else(|| {
            SstError::Config(format!(
                "{} needs an [object_store] endpoint to be configured",
                location
            ))
        })?;
        let mut backend = ObjectStoreBackend::new(client, location)?;
        if let Some(limit) = self.size_limit {
            backend = backend.with_size_limit(limit);
        }
        Ok(backend)
    }
}
