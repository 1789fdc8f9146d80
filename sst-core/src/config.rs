//! TOML configuration
//!
//! Every section is optional. Credentials never live in the file; the
//! `[object_store]` section names the environment variables that hold them.

use crate::error::{SstError, SstResult};
use crate::filter::{FileFilter, DEFAULT_PATTERN};
use crate::location::Location;
use crate::operations::SyncOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SstConfig {
    pub object_store: Option<ObjectStoreSection>,
    pub sync: SyncSection,
    pub locations: BTreeMap<String, Location>,
    pub samples: Vec<SampleAsset>,
}

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreSection {
    /// `host:port` or a full URL
    pub endpoint: String,
    pub region: String,
    pub secure: bool,
    /// Accept a plain-HTTP endpoint (`secure = false` or an `http://` URL)
    pub allow_http: bool,
    pub verify_tls: bool,
    pub access_key_env: String,
    pub secret_key_env: String,
    /// Keys per listing page
    pub page_size: Option<u32>,
}

impl Default for ObjectStoreSection {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".to_string(),
            secure: true,
            allow_http: false,
            verify_tls: true,
            access_key_env: "ISILON_S3_KEY".to_string(),
            secret_key_env: "ISILON_S3_SECRET".to_string(),
            page_size: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub pattern: String,
    pub concurrency: usize,
    pub verify: bool,
    pub flatten: bool,
    pub max_object_size: Option<u64>,
}

impl Default for SyncSection {
    fn default() -> Self {
        let options = SyncOptions::default();
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            concurrency: options.concurrency,
            verify: options.verify,
            flatten: options.flatten,
            max_object_size: None,
        }
    }
}

impl SyncSection {
    pub fn filter(&self) -> SstResult<FileFilter> {
        FileFilter::glob(&self.pattern)
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions::default()
            .with_concurrency(self.concurrency)
            .with_verify(self.verify)
            .with_flatten(self.flatten)
    }
}

/// A remote file to download into the input directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleAsset {
    pub file_name: String,
    pub url: String,
}

impl SampleAsset {
    pub fn new(file_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            url: url.into(),
        }
    }
}

/// Fluorescence microscopy images used by the Isilon demos
pub fn default_samples() -> Vec<SampleAsset> {
    vec![
        SampleAsset::new(
            "B1_01_2_1_GFP_001.tif",
            "https://figshare.com/ndownloader/files/39518140",
        ),
        SampleAsset::new(
            "B1_01_2_2_GFP_001.tif",
            "https://figshare.com/ndownloader/files/39518143",
        ),
    ]
}

impl SstConfig {
    pub fn from_toml_str(input: &str) -> SstResult<Self> {
        toml::from_str(input).map_err(|e| SstError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> SstResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SstError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// `<config dir>/sst/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "hyperpolymath", "sst")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// An explicit path must exist; the default path is optional.
    pub fn load_or_default(path: Option<&Path>) -> SstResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Resolve `@name` through `[locations]`, anything else as a location string.
    pub fn resolve_location(&self, arg: &str) -> SstResult<Location> {
        match arg.strip_prefix('@') {
            Some(name) => self
                .locations
                .get(name)
                .cloned()
                .ok_or_else(|| SstError::Config(format!("unknown location: @{}", name))),
            None => Location::parse(arg),
        }
    }

    pub fn samples(&self) -> Vec<SampleAsset> {
        if self.samples.is_empty() {
            default_samples()
        } else {
            self.samples.clone()
        }
    }
}
