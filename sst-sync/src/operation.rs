//! Batch transfer and purge

use crate::report::SyncReport;
use futures::{stream, StreamExt};
use sst_core::{
    Backend, Direction, FileFilter, FileRecord, Operation, SstError, SstResult, SyncOptions,
    TransferError, TransferOutcome,
};
use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

/// List-then-transfer workflow between two backends.
///
/// There is no transaction across files and no automatic retry. To retry,
/// rerun with `FileFilter::with_names(report.failed_names())`.
#[derive(Debug, Clone, Default)]
pub struct SyncOperation {
    options: SyncOptions,
}

impl SyncOperation {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Copy every record matching `filter` from `source` to `destination`.
    ///
    /// Fails only when the source listing fails; per-file failures are
    /// recorded in the report.
    pub async fn run(
        &self,
        source: &dyn Backend,
        destination: &dyn Backend,
        filter: &FileFilter,
    ) -> SstResult<SyncReport> {
        let start = Instant::now();
        let records = source.list_all(filter).await?;
        let direction = Direction::between(source.kind(), destination.kind());

        tracing::info!(
            source = %source.location(),
            destination = %destination.location(),
            direction = %direction,
            count = records.len(),
            concurrency = self.options.concurrency,
            "Starting sync"
        );

        let planned = self.plan_targets(records, destination);
        let outcomes = self
            .drive(planned, |(record, conflict)| async move {
                match conflict {
                    Some(e) => {
                        tracing::warn!(
                            record = %record.backend_identifier,
                            error = %e,
                            "Transfer skipped"
                        );
                        TransferOutcome::failed(record, direction, &e)
                    }
                    None => self.transfer(source, destination, record, direction).await,
                }
            })
            .await;
        let report = SyncReport::new(outcomes, start.elapsed());

        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            size_bytes = report.bytes_transferred(),
            duration_ms = report.duration().as_secs_f64() * 1000.0,
            "Sync complete"
        );
        Ok(report)
    }

    /// Delete every record matching `filter`.
    pub async fn purge(&self, backend: &dyn Backend, filter: &FileFilter) -> SstResult<SyncReport> {
        let start = Instant::now();
        let records = backend.list_all(filter).await?;
        let report = self.purge_records(backend, &records).await;
        Ok(SyncReport::new(report.into_outcomes(), start.elapsed()))
    }

    /// Delete an explicit set of records, such as an earlier listing.
    ///
    /// An object store reports already-absent records as deleted; a
    /// filesystem reports them as `NotFound`.
    pub async fn purge_records(&self, backend: &dyn Backend, records: &[FileRecord]) -> SyncReport {
        let start = Instant::now();
        let outcomes = self
            .drive(records.to_vec(), |record| async move {
                match backend.delete(&record).await {
                    Ok(()) => TransferOutcome::success(record, Direction::Delete, None),
                    Err(e) => {
                        tracing::warn!(
                            backend = %backend.id(),
                            record = %record.backend_identifier,
                            error = %e,
                            "Delete failed"
                        );
                        TransferOutcome::failed(record, Direction::Delete, &e)
                    }
                }
            })
            .await;

        let report = SyncReport::new(outcomes, start.elapsed());
        tracing::info!(
            location = %backend.location(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Purge complete"
        );
        report
    }

    /// Pair each record with the reason it must not be written, if any.
    ///
    /// With `flatten`, the first record in listing order claims a file name;
    /// later records with the same name fail instead of overwriting it.
    fn plan_targets(
        &self,
        records: Vec<FileRecord>,
        destination: &dyn Backend,
    ) -> Vec<(FileRecord, Option<SstError>)> {
        if !self.options.flatten {
            return records.into_iter().map(|r| (r, None)).collect();
        }

        let mut claimed: HashMap<String, String> = HashMap::new();
        records
            .into_iter()
            .map(|record| {
                let name = record.file_name().to_string();
                let conflict = match claimed.get(&name) {
                    Some(owner) => Some(SstError::from(TransferError::new(
                        destination.id(),
                        Operation::Put,
                        name,
                        SstError::InvalidLocation(format!(
                            "{} flattens onto the same name as {}",
                            record.relative_name, owner
                        )),
                    ))),
                    None => {
                        claimed.insert(name, record.relative_name.clone());
                        None
                    }
                };
                (record, conflict)
            })
            .collect()
    }

    /// One outcome per item, sequentially or through a bounded pool.
    async fn drive<T, F, Fut>(&self, items: Vec<T>, attempt: F) -> Vec<TransferOutcome>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = TransferOutcome>,
    {
        if self.options.concurrency <= 1 {
            let mut outcomes = Vec::with_capacity(items.len());
            for item in items {
                outcomes.push(attempt(item).await);
            }
            return outcomes;
        }

        stream::iter(items)
            .map(attempt)
            .buffer_unordered(self.options.concurrency)
            .collect()
            .await
    }

    async fn transfer(
        &self,
        source: &dyn Backend,
        destination: &dyn Backend,
        record: FileRecord,
        direction: Direction,
    ) -> TransferOutcome {
        let start = Instant::now();
        match self.copy_one(source, destination, &record).await {
            Ok(written) => {
                tracing::debug!(
                    record = %record.backend_identifier,
                    target = %written.backend_identifier,
                    size_bytes = written.size_bytes,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Transfer successful"
                );
                TransferOutcome::success(record, direction, Some(written.backend_identifier))
            }
            Err(e) => {
                tracing::warn!(
                    record = %record.backend_identifier,
                    error = %e,
                    "Transfer failed"
                );
                TransferOutcome::failed(record, direction, &e)
            }
        }
    }

    async fn copy_one(
        &self,
        source: &dyn Backend,
        destination: &dyn Backend,
        record: &FileRecord,
    ) -> SstResult<FileRecord> {
        let data = source.get(record).await?;

        let target = if self.options.flatten {
            FileRecord::new(
                record.file_name(),
                record.size_bytes,
                record.backend_identifier.clone(),
            )
        } else {
            record.clone()
        };

        let expected = self.options.verify.then(|| blake3::hash(&data));
        let written = destination.put(data, &target).await?;

        if let Some(expected) = expected {
            let copy = destination.get(&written).await?;
            if blake3::hash(&copy) != expected {
                return Err(TransferError::new(
                    destination.id(),
                    Operation::Get,
                    written.backend_identifier,
                    SstError::ChecksumMismatch,
                )
                .into());
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_sequential() {
        let op = SyncOperation::default();
        assert_eq!(op.options().concurrency, 1);
        assert!(!op.options().verify);
    }
}
