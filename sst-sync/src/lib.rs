//! Sync workflows for the Storage Sync Toolkit
//!
//! [`SyncOperation`] lists records on one backend and transfers them to
//! another, or purges them, recording one [`TransferOutcome`] per file in a
//! [`SyncReport`]. Only listing failures abort an operation.
//!
//! [`TransferOutcome`]: sst_core::TransferOutcome

mod operation;
mod report;

pub use operation::SyncOperation;
pub use report::SyncReport;
