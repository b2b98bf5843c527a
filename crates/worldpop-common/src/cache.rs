//! Deterministic cache file naming.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Suffix of in-flight download files. Files carrying it are never complete.
pub const TEMP_SUFFIX: &str = ".download";

/// Extension of every raster in the WorldPop archive.
pub const RASTER_EXTENSION: &str = "tif";

/// File name for one (product, country[, year]) cache entry.
///
/// `cache_file_name("ppp", "cod", Some(2020))` is `ppp_COD_2020.tif`.
pub fn cache_file_name(product: &str, iso3: &str, year: Option<i32>) -> String {
    let iso3 = iso3.to_uppercase();
    match year {
        Some(year) => format!("{product}_{iso3}_{year}.{RASTER_EXTENSION}"),
        None => format!("{product}_{iso3}.{RASTER_EXTENSION}"),
    }
}

/// Sibling path used while `path` is being downloaded.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Whether `path` is an in-flight download artifact.
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TEMP_SUFFIX))
}

/// One remote resource and the local path it is cached at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Path relative to the remote data host.
    pub remote_path: String,
    pub local_path: PathBuf,
}

impl FileDescriptor {
    pub fn new(remote_path: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            remote_path: remote_path.into(),
            local_path: local_path.into(),
        }
    }

    /// Path of the in-flight temporary file for this entry.
    pub fn temp_path(&self) -> PathBuf {
        temp_path_for(&self.local_path)
    }

    /// Same descriptor rooted at a different cache directory.
    pub fn rebased(&self, root: &Path) -> Self {
        let name = self
            .local_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.local_path.clone());
        Self {
            remote_path: self.remote_path.clone(),
            local_path: root.join(name),
        }
    }
}
