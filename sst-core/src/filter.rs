//! Record selection

use crate::error::{SstError, SstResult};
use glob::Pattern;
use std::collections::BTreeSet;

pub const DEFAULT_PATTERN: &str = "*.tif";

/// Selects records by a glob on the file name, optionally narrowed to an
/// explicit set of relative names (e.g. the failures of an earlier run).
#[derive(Debug, Clone)]
pub struct FileFilter {
    pattern: Pattern,
    names: Option<BTreeSet<String>>,
}

impl FileFilter {
    pub fn glob(pattern: &str) -> SstResult<Self> {
        let pattern = Pattern::new(pattern)
            .map_err(|e| SstError::Config(format!("invalid pattern {:?}: {}", pattern, e)))?;
        Ok(Self { pattern, names: None })
    }

    /// Files ending in `.{ext}`
    pub fn extension(ext: &str) -> SstResult<Self> {
        Self::glob(&format!("*.{}", ext.trim_start_matches('.')))
    }

    pub fn all() -> Self {
        Self {
            pattern: Pattern::new("*").unwrap_or_default(),
            names: None,
        }
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn matches(&self, relative_name: &str) -> bool {
        if let Some(names) = &self.names {
            if !names.contains(relative_name) {
                return false;
            }
        }
        let file_name = relative_name.rsplit('/').next().unwrap_or(relative_name);
        self.pattern.matches(file_name)
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::glob(DEFAULT_PATTERN).unwrap_or_else(|_| Self::all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_tif_at_any_depth() {
        let filter = FileFilter::default();
        assert!(filter.matches("a.tif"));
        assert!(filter.matches("plate/b.tif"));
        assert!(!filter.matches("example.parquet"));
        assert!(!filter.matches("tif/readme.txt"));
    }

    #[test]
    fn test_extension() {
        let filter = FileFilter::extension(".parquet").unwrap();
        assert_eq!(filter.pattern(), "*.parquet");
        assert!(filter.matches("example.parquet"));
    }

    #[test]
    fn test_with_names() {
        let filter = FileFilter::default().with_names(["b.tif"]);
        assert!(filter.matches("b.tif"));
        assert!(!filter.matches("a.tif"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(FileFilter::glob("[unclosed"), Err(SstError::Config(_))));
    }

    #[test]
    fn test_all() {
        let filter = FileFilter::all();
        assert!(filter.matches("anything"));
        assert!(filter.matches("deep/er/file.bin"));
    }
}
