// SPDX-License-Identifier: AGPL-3.0-or-later
//! CLI command implementations

use console::style;
use sst_core::{
    Backend, FileFilter, FileRecord, ListedEntry, Location, SstConfig, SstError, SstResult,
    TransferStatus,
};
use sst_providers::{BackendFactory, ObjectClient, S3Client, S3Config, SampleFetcher};
use sst_sync::{SyncOperation, SyncReport};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tabled::{Table, Tabled};

/// Where the sample images land when neither `--dir` nor `@input` is given
const DEFAULT_INPUT_DIR: &str = "src/demo/data/input";

/// Command-line overrides of the `[sync]` section
pub struct SyncOverrides {
    pub pattern: Option<String>,
    pub concurrency: Option<usize>,
    pub verify: bool,
    pub flatten: bool,
}

/// Loaded configuration shared by every command
pub struct Session {
    config: SstConfig,
    verbose: bool,
}

#[derive(Tabled)]
struct LsRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Identifier")]
    identifier: String,
}

impl LsRow {
    fn from_record(record: &FileRecord) -> Self {
        Self {
            name: record.relative_name.clone(),
            size: bytesize::ByteSize(record.size_bytes).to_string(),
            identifier: record.backend_identifier.clone(),
        }
    }

    fn from_entry(entry: &ListedEntry) -> Self {
        match entry {
            ListedEntry::File(record) => Self::from_record(record),
            ListedEntry::DirectoryMarker(marker) => Self {
                name: style("(dir)").cyan().to_string(),
                size: "-".to_string(),
                identifier: marker.key.clone(),
            },
        }
    }
}

fn env_var(name: &str) -> SstResult<String> {
    std::env::var(name)
        .map_err(|_| SstError::Config(format!("environment variable {} is not set", name)))
}

impl Session {
    pub fn load(path: Option<&Path>, verbose: bool) -> SstResult<Self> {
        let config = SstConfig::load_or_default(path)?;
        Ok(Self { config, verbose })
    }

    fn resolve(&self, arg: &str) -> SstResult<Location> {
        let location = self.config.resolve_location(arg)?;
        if self.verbose {
            eprintln!("Location: {} -> {}", arg, location);
        }
        Ok(location)
    }

    fn filter(&self, pattern: Option<&str>) -> SstResult<FileFilter> {
        match pattern {
            Some(pattern) => FileFilter::glob(pattern),
            None => self.config.sync.filter(),
        }
    }

    /// The S3 client is only built when an object-store location is in play,
    /// so filesystem-only commands never need credentials.
    fn factory(&self, locations: &[&Location]) -> SstResult<BackendFactory> {
        let mut factory = BackendFactory::new().with_size_limit(self.config.sync.max_object_size);
        if locations.iter().any(|l| l.is_object_store()) {
            factory = factory.with_object_client(self.object_client()?);
        }
        Ok(factory)
    }

    fn object_client(&self) -> SstResult<Arc<dyn ObjectClient>> {
        let section = self.config.object_store.as_ref().ok_or_else(|| {
            SstError::Config("object-store locations need an [object_store] section".into())
        })?;
        let access_key = env_var(&section.access_key_env)?;
        let secret_key = env_var(&section.secret_key_env)?;

        let client = S3Client::new(S3Config::from_section(section, &access_key, &secret_key))?;
        tracing::debug!(endpoint = %section.endpoint, region = %section.region, "Object client ready");
        Ok(Arc::new(client))
    }

    fn print_report(&self, report: &SyncReport, json: bool) -> SstResult<()> {
        if json {
            println!("{}", report.to_json()?);
            return Ok(());
        }

        for outcome in report.outcomes() {
            let status = match &outcome.status {
                TransferStatus::Success => style(outcome.status.to_string()).green(),
                TransferStatus::Failed(_) => style(outcome.status.to_string()).red(),
            };
            println!("{} {}", outcome.file.backend_identifier, status);
        }

        println!(
            "{} succeeded, {} failed, {} in {:.2}s",
            report.succeeded(),
            report.failed(),
            bytesize::ByteSize(report.bytes_transferred()),
            report.duration().as_secs_f64()
        );
        Ok(())
    }

    /// List records at a location
    pub async fn ls(&self, location: &str, raw: bool, pattern: Option<&str>) -> SstResult<()> {
        let location = self.resolve(location)?;
        let backend = self.factory(&[&location])?.open(&location)?;

        let (rows, total): (Vec<LsRow>, u64) = if raw {
            let entries = backend.list_raw().await?;
            let total = entries.iter().map(|e| e.size()).sum();
            (entries.iter().map(LsRow::from_entry).collect(), total)
        } else {
            let records = backend.list_all(&self.filter(pattern)?).await?;
            let total = records.iter().map(|r| r.size_bytes).sum();
            (records.iter().map(LsRow::from_record).collect(), total)
        };

        if rows.is_empty() {
            println!("(no records)");
            return Ok(());
        }

        let count = rows.len();
        println!("{}", Table::new(rows));
        println!("{} entries, {}", count, bytesize::ByteSize(total));
        Ok(())
    }

    /// Copy matching records between two locations
    pub async fn sync(
        &self,
        source: &str,
        dest: &str,
        overrides: SyncOverrides,
        json: bool,
    ) -> SstResult<()> {
        let source = self.resolve(source)?;
        let dest = self.resolve(dest)?;
        let factory = self.factory(&[&source, &dest])?;
        let from = factory.open(&source)?;
        let to = factory.open(&dest)?;

        // A filesystem source is never created; a bucket source is checked.
        if source.is_object_store() {
            from.prepare().await?;
        }
        to.prepare().await?;

        let mut options = self.config.sync.options();
        if let Some(concurrency) = overrides.concurrency {
            options = options.with_concurrency(concurrency);
        }
        if overrides.verify {
            options = options.with_verify(true);
        }
        if overrides.flatten {
            options = options.with_flatten(true);
        }
        let filter = self.filter(overrides.pattern.as_deref())?;

        if self.verbose {
            eprintln!("Syncing: {} -> {} ({})", source, dest, filter.pattern());
        }

        let report = SyncOperation::new(options)
            .run(from.as_ref(), to.as_ref(), &filter)
            .await?;
        self.print_report(&report, json)?;

        if report.failed() > 0 {
            return Err(SstError::Other(format!(
                "{} of {} transfers failed",
                report.failed(),
                report.len()
            )));
        }
        Ok(())
    }

    /// Delete matching records at a location
    pub async fn purge(&self, location: &str, pattern: Option<&str>, json: bool) -> SstResult<()> {
        let location = self.resolve(location)?;
        let backend = self.factory(&[&location])?.open(&location)?;
        let filter = self.filter(pattern)?;

        let report = SyncOperation::default().purge(backend.as_ref(), &filter).await?;
        self.print_report(&report, json)?;

        if report.failed() > 0 {
            return Err(SstError::Other(format!(
                "{} of {} deletes failed",
                report.failed(),
                report.len()
            )));
        }
        Ok(())
    }

    /// Write one record to stdout
    pub async fn cat(&self, location: &str, name: &str) -> SstResult<()> {
        let location = self.resolve(location)?;
        let backend = self.factory(&[&location])?.open(&location)?;

        let filter = FileFilter::all().with_names([name]);
        let record = backend
            .list_all(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SstError::NotFound(format!("{} in {}", name, location)))?;

        let data = backend.get(&record).await?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&data)?;
        stdout.flush()?;
        Ok(())
    }

    /// Create a directory, or a directory marker under an object-store prefix
    pub async fn mkdir(&self, location: &str) -> SstResult<()> {
        let location = self.resolve(location)?;
        let factory = self.factory(&[&location])?;

        if location.is_object_store() {
            let backend = factory.open_object_store(&location)?;
            backend.prepare().await?;
            if backend.prefix().is_empty() {
                println!("Bucket {} exists", backend.bucket());
                return Ok(());
            }
            backend.create_directory_marker().await?;
        } else {
            factory.open(&location)?.prepare().await?;
        }

        println!("Created {}", location);
        Ok(())
    }

    /// Download the configured sample images
    pub async fn fetch(&self, dir: Option<&str>) -> SstResult<()> {
        let target = match dir {
            Some(dir) => self.resolve(dir)?,
            None => self
                .config
                .locations
                .get("input")
                .cloned()
                .unwrap_or_else(|| Location::filesystem(DEFAULT_INPUT_DIR)),
        };
        let root = match &target {
            Location::Filesystem { root } => root.clone(),
            Location::ObjectStore { .. } => {
                return Err(SstError::InvalidLocation(format!(
                    "samples download into a local directory, not {}",
                    target
                )))
            }
        };

        let samples = self.config.samples();
        if self.verbose {
            eprintln!("Fetching {} samples into {}", samples.len(), root.display());
        }

        let report = SampleFetcher::new()?.fetch_all(&root, &samples).await?;
        for asset in &report.fetched {
            println!(
                "{} {} ({})",
                style("fetched").green(),
                asset.path.display(),
                bytesize::ByteSize(asset.size_bytes)
            );
        }
        for failure in &report.failed {
            println!("{} {}", style("failed").red(), failure);
        }

        if !report.is_complete() {
            return Err(SstError::Other(format!(
                "{} of {} downloads failed",
                report.failed.len(),
                samples.len()
            )));
        }
        Ok(())
    }
}
