//! Location abstraction: where files live

use crate::error::{SstError, SstResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const S3_SCHEME: &str = "s3://";
const FILE_SCHEME: &str = "file://";

/// Storage technology behind a location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Filesystem,
    ObjectStore,
}

/// A logical root files are organized under.
///
/// A bucket exists exactly for object-store locations. Object prefixes are
/// kept normalized: no leading separator, and a non-empty prefix ends in
/// exactly one `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Location {
    Filesystem { root: PathBuf },
    ObjectStore { bucket: String, prefix: String },
}

impl Location {
    pub fn filesystem(root: impl AsRef<Path>) -> Self {
        Self::Filesystem {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn object_store(bucket: impl Into<String>, prefix: impl AsRef<str>) -> SstResult<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() || bucket.contains('/') {
            return Err(SstError::InvalidLocation(format!(
                "invalid bucket name: {:?}",
                bucket
            )));
        }
        Ok(Self::ObjectStore {
            bucket,
            prefix: normalize_prefix(prefix.as_ref()),
        })
    }

    /// Parse `s3://bucket/prefix/`, `file:///path`, `~/path` or a bare path.
    pub fn parse(input: &str) -> SstResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SstError::InvalidLocation("empty location".into()));
        }

        if let Some(rest) = input.strip_prefix(S3_SCHEME) {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            return Self::object_store(bucket, prefix);
        }

        if let Some(rest) = input.strip_prefix(FILE_SCHEME) {
            if rest.is_empty() {
                return Err(SstError::InvalidLocation(input.to_string()));
            }
            return Ok(Self::filesystem(rest));
        }

        if input.contains("://") {
            return Err(SstError::InvalidLocation(format!(
                "unsupported scheme: {}",
                input
            )));
        }

        Ok(Self::filesystem(expand_home(input)))
    }

    pub fn kind(&self) -> LocationKind {
        match self {
            Location::Filesystem { .. } => LocationKind::Filesystem,
            Location::ObjectStore { .. } => LocationKind::ObjectStore,
        }
    }

    pub fn bucket(&self) -> Option<&str> {
        match self {
            Location::ObjectStore { bucket, .. } => Some(bucket),
            Location::Filesystem { .. } => None,
        }
    }

    /// Directory path or object prefix
    pub fn root(&self) -> String {
        match self {
            Location::Filesystem { root } => root.display().to_string(),
            Location::ObjectStore { prefix, .. } => prefix.clone(),
        }
    }

    pub fn is_object_store(&self) -> bool {
        self.kind() == LocationKind::ObjectStore
    }

    /// Object key for a relative name; `None` for filesystem locations.
    pub fn object_key(&self, relative_name: &str) -> Option<String> {
        match self {
            Location::ObjectStore { prefix, .. } => {
                Some(format!("{}{}", prefix, relative_name.trim_start_matches('/')))
            }
            Location::Filesystem { .. } => None,
        }
    }

    /// Filesystem path for a relative name; `None` for object-store locations.
    pub fn file_path(&self, relative_name: &str) -> Option<PathBuf> {
        match self {
            Location::Filesystem { root } => {
                let mut path = root.clone();
                for seg in relative_name.split('/').filter(|s| !s.is_empty()) {
                    path.push(seg);
                }
                Some(path)
            }
            Location::ObjectStore { .. } => None,
        }
    }

    /// Name of an object key relative to this location's prefix.
    pub fn relative_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        match self {
            Location::ObjectStore { prefix, .. } => key.strip_prefix(prefix.as_str()),
            Location::Filesystem { .. } => None,
        }
    }
}

/// Strip leading separators, collapse empty segments, end with one `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        String::new()
    } else {
        format!("{}/", segments.join("/"))
    }
}

fn expand_home(input: &str) -> PathBuf {
    let rest = match input {
        "~" => Some(""),
        _ => input.strip_prefix("~/"),
    };
    match (rest, directories::BaseDirs::new()) {
        (Some(rest), Some(dirs)) => dirs.home_dir().join(rest),
        _ => PathBuf::from(input),
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Filesystem { root } => {
                let root = root.display().to_string();
                // Keep paths that would otherwise reparse differently behind the scheme.
                if root.starts_with('~') || root.contains("://") {
                    write!(f, "{}{}", FILE_SCHEME, root)
                } else {
                    f.write_str(&root)
                }
            }
            Location::ObjectStore { bucket, prefix } => {
                write!(f, "{}{}/{}", S3_SCHEME, bucket, prefix)
            }
        }
    }
}

impl FromStr for Location {
    type Err = SstError;

    fn from_str(s: &str) -> SstResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Location {
    type Error = SstError;

    fn try_from(value: String) -> SstResult<Self> {
        Self::parse(&value)
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3() {
        let loc = Location::parse("s3://bandicoot/example/").unwrap();
        assert_eq!(loc.kind(), LocationKind::ObjectStore);
        assert_eq!(loc.bucket(), Some("bandicoot"));
        assert_eq!(loc.root(), "example/");
    }

    #[test]
    fn test_parse_s3_bucket_only() {
        let loc = Location::parse("s3://bandicoot").unwrap();
        assert_eq!(loc.bucket(), Some("bandicoot"));
        assert_eq!(loc.root(), "");
        assert_eq!(loc.object_key("a.tif").as_deref(), Some("a.tif"));
    }

    #[test]
    fn test_parse_s3_empty_bucket_rejected() {
        assert!(matches!(
            Location::parse("s3:///prefix"),
            Err(SstError::InvalidLocation(_))
        ));
    }

    #[test]
    fn test_parse_filesystem() {
        let loc = Location::parse("/mnt/isilon").unwrap();
        assert_eq!(loc.kind(), LocationKind::Filesystem);
        assert!(loc.bucket().is_none());
        assert_eq!(loc.root(), "/mnt/isilon");

        let loc = Location::parse("file:///data/input").unwrap();
        assert_eq!(loc, Location::filesystem("/data/input"));
    }

    #[test]
    fn test_parse_unknown_scheme() {
        assert!(Location::parse("gs://bucket/x").is_err());
        assert!(Location::parse("   ").is_err());
    }

    #[test]
    fn test_prefix_normalization() {
        assert_eq!(normalize_prefix("example"), "example/");
        assert_eq!(normalize_prefix("/example//"), "example/");
        assert_eq!(normalize_prefix("a//b/c"), "a/b/c/");
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("///"), "");
    }

    #[test]
    fn test_object_key_never_doubles_separator() {
        let loc = Location::object_store("bandicoot", "example/").unwrap();
        assert_eq!(loc.object_key("example.parquet").as_deref(), Some("example/example.parquet"));
        assert_eq!(loc.object_key("/example.parquet").as_deref(), Some("example/example.parquet"));
    }

    #[test]
    fn test_relative_key() {
        let loc = Location::object_store("bandicoot", "example").unwrap();
        assert_eq!(loc.relative_key("example/sub/a.tif"), Some("sub/a.tif"));
        assert_eq!(loc.relative_key("other/a.tif"), None);
    }

    #[test]
    fn test_file_path() {
        let loc = Location::filesystem("/data");
        assert_eq!(loc.file_path("sub/a.tif"), Some(PathBuf::from("/data/sub/a.tif")));
        assert!(Location::object_store("b", "").unwrap().file_path("a").is_none());
    }

    #[test]
    fn test_display_round_trips() {
        for input in ["s3://bandicoot/example/", "s3://bandicoot/", "/mnt/isilon"] {
            let loc = Location::parse(input).unwrap();
            assert_eq!(Location::parse(&loc.to_string()).unwrap(), loc);
        }
    }

    #[test]
    fn test_ambiguous_filesystem_roots_round_trip() {
        for input in ["file://~/x", "file://s3://x", "file://gs://bucket/x"] {
            let loc = Location::parse(input).unwrap();
            assert_eq!(loc.kind(), LocationKind::Filesystem);
            assert_eq!(loc.to_string(), input);
            assert_eq!(Location::parse(&loc.to_string()).unwrap(), loc);
        }

        let loc = Location::filesystem("~/literal");
        let rendered: String = loc.clone().into();
        assert_eq!(Location::try_from(rendered).unwrap(), loc);
    }

    #[test]
    fn test_serde_as_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            loc: Location,
        }
        let w: Wrapper = toml::from_str("loc = \"s3://bandicoot/example\"").unwrap();
        assert_eq!(w.loc, Location::object_store("bandicoot", "example/").unwrap());
    }
}
