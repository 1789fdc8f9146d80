//! Operation options

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// In-flight transfers; 1 keeps listing order
    pub concurrency: usize,
    /// Read each file back from the destination and compare digests
    pub verify: bool,
    /// Write under the bare file name instead of the relative path
    pub flatten: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            verify: false,
            flatten: false,
        }
    }
}

impl SyncOptions {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }
}
