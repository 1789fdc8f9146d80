//! Storage Sync Toolkit Core
//!
//! Core traits and types shared by every backend and by the sync layer:
//! locations, listed records, transfer outcomes and the `Backend` trait.

pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod location;
pub mod operations;
pub mod outcome;
pub mod record;

pub use backend::{Backend, RecordStream};
pub use config::{SampleAsset, SstConfig};
pub use error::{DownloadError, ErrorKind, Operation, SstError, SstResult, TransferError};
pub use filter::FileFilter;
pub use location::{Location, LocationKind};
pub use operations::SyncOptions;
pub use outcome::{Direction, FailureReason, TransferOutcome, TransferStatus};
pub use record::{DirectoryMarker, FileRecord, ListedEntry};
