//! Sample asset downloads
//!
//! Pulls the demo images into a local input directory. A failed download is
//! logged and recorded; the rest of the batch still runs.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use sst_core::config::SampleAsset;
use sst_core::error::{DownloadError, SstError, SstResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::pin;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// One completed download
#[derive(Debug, Clone, Serialize)]
pub struct FetchedAsset {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Outcome of a batch of downloads
#[derive(Debug, Default)]
pub struct FetchReport {
    pub fetched: Vec<FetchedAsset>,
    pub failed: Vec<DownloadError>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn bytes_fetched(&self) -> u64 {
        self.fetched.iter().map(|a| a.size_bytes).sum()
    }
}

pub struct SampleFetcher {
    http: reqwest::Client,
}

impl SampleFetcher {
    pub fn new() -> SstResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sst/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SstError::Network(e.to_string()))?;
        Ok(Self { http })
    }

    /// Download every asset into `dir`, creating it first.
    ///
    /// Only a failure to create `dir` aborts the batch.
    pub async fn fetch_all(&self, dir: &Path, assets: &[SampleAsset]) -> SstResult<FetchReport> {
        fs::create_dir_all(dir).await?;

        let mut report = FetchReport::default();
        for asset in assets {
            match self.fetch_one(dir, asset).await {
                Ok(fetched) => {
                    tracing::info!(
                        url = %asset.url,
                        path = %fetched.path.display(),
                        size_bytes = fetched.size_bytes,
                        "Downloaded sample"
                    );
                    report.fetched.push(fetched);
                }
                Err(e) => {
                    tracing::warn!(url = %asset.url, status = ?e.status, error = %e.message, "Sample download failed");
                    report.failed.push(e);
                }
            }
        }
        Ok(report)
    }

    async fn fetch_one(
        &self,
        dir: &Path,
        asset: &SampleAsset,
    ) -> Result<FetchedAsset, DownloadError> {
        let failure = |status: Option<u16>, message: String| DownloadError {
            url: asset.url.clone(),
            status,
            message,
        };

        let file_name = Path::new(&asset.file_name)
            .file_name()
            .ok_or_else(|| failure(None, format!("invalid file name {:?}", asset.file_name)))?;
        let path = dir.join(file_name);

        let response = self
            .http
            .get(&asset.url)
            .send()
            .await
            .map_err(|e| failure(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure(Some(status.as_u16()), format!("HTTP {}", status)));
        }

        let size_bytes = write_committed(&path, response.bytes_stream())
            .await
            .map_err(|message| failure(None, message))?;

        Ok(FetchedAsset {
            file_name: asset.file_name.clone(),
            path,
            size_bytes,
        })
    }
}

/// Stream `body` into a hidden sibling of `path` and rename it into place
/// once complete. On failure the partial file is removed and `path` is
/// left untouched.
async fn write_committed<S, E>(path: &Path, body: S) -> Result<u64, String>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let part = path.with_file_name(format!(".{}.part", file_name));

    let result = async {
        let mut file = fs::File::create(&part).await.map_err(|e| e.to_string())?;
        let mut body = pin!(body);
        let mut size_bytes = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            file.write_all(&chunk).await.map_err(|e| e.to_string())?;
            size_bytes += chunk.len() as u64;
        }
        file.sync_all().await.map_err(|e| e.to_string())?;
        drop(file);

        fs::rename(&part, path).await.map_err(|e| e.to_string())?;
        Ok::<_, String>(size_bytes)
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&part).await;
    }
    result
}
