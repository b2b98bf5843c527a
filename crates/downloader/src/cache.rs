//! Cache maintenance: removing orphaned temp files and purging rasters.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use worldpop_common::{is_temp_file, RASTER_EXTENSION};

/// What a purge matched and removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurgeReport {
    pub dry_run: bool,
    pub matched_files: usize,
    /// Always zero for a dry run.
    pub deleted_files: usize,
    pub total_size_bytes: u64,
    /// Decimal megabytes, rounded to two places.
    pub total_size_mb: f64,
}

/// Files under `root` (recursively) accepted by `keep`. Unreadable entries are skipped.
fn walk_files<'a>(
    root: &'a Path,
    keep: impl Fn(&Path) -> bool + 'a,
) -> impl Iterator<Item = walkdir::DirEntry> + 'a {
    WalkDir::new(root)
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable cache entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(move |entry| keep(entry.path()))
}

/// Delete every in-flight download artifact under `root`.
///
/// Returns the number of files removed. Failures to delete a file are logged.
pub fn repair_cache(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }

    let mut removed = 0;
    for entry in walk_files(root, is_temp_file) {
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(path = %entry.path().display(), "Removed partial download");
                removed += 1;
            }
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Failed to delete partial download");
            }
        }
    }

    if removed > 0 {
        info!(root = %root.display(), removed = removed, "Repaired download cache");
    }
    removed
}

fn is_raster(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == RASTER_EXTENSION)
}

/// Delete every cached raster under `root`, or only report what would go when `dry_run`.
pub fn purge_cache(root: &Path, dry_run: bool) -> PurgeReport {
    let mut matched_files = 0;
    let mut deleted_files = 0;
    let mut total_size_bytes = 0u64;

    if root.exists() {
        for entry in walk_files(root, is_raster) {
            matched_files += 1;
            total_size_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);

            if dry_run {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => deleted_files += 1,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to delete cached file");
                }
            }
        }
    }

    let report = PurgeReport {
        dry_run,
        matched_files,
        deleted_files,
        total_size_bytes,
        total_size_mb: (total_size_bytes as f64 / 1e6 * 100.0).round() / 100.0,
    };
    info!(
        root = %root.display(),
        dry_run = dry_run,
        matched = report.matched_files,
        deleted = report.deleted_files,
        size_mb = report.total_size_mb,
        "Purged raster cache"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path, len: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![0u8; len]).unwrap();
    }

    #[test]
    fn test_repair_removes_only_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("ppp_COD_2020.tif"), 10);
        touch(&dir.path().join("ppp_CAF_2020.tif.download"), 5);
        touch(&dir.path().join("nested/ppp_SSD_2020.tif.download"), 5);
        touch(&dir.path().join("manifest/manifest.json"), 5);

        assert_eq!(repair_cache(dir.path()), 2);
        assert!(dir.path().join("ppp_COD_2020.tif").exists());
        assert!(dir.path().join("manifest/manifest.json").exists());
        assert!(!dir.path().join("nested/ppp_SSD_2020.tif.download").exists());
        assert_eq!(repair_cache(dir.path()), 0);
    }

    #[test]
    fn test_repair_of_missing_root_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(repair_cache(&dir.path().join("absent")), 0);
    }

    #[test]
    fn test_purge_dry_run_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.tif"), 1_500_000);
        touch(&dir.path().join("sub/b.tif"), 500_000);
        touch(&dir.path().join("c.tif.download"), 100);

        let report = purge_cache(dir.path(), true);
        assert!(report.dry_run);
        assert_eq!(report.matched_files, 2);
        assert_eq!(report.deleted_files, 0);
        assert_eq!(report.total_size_bytes, 2_000_000);
        assert_eq!(report.total_size_mb, 2.0);
        assert!(dir.path().join("a.tif").exists());
    }

    #[test]
    fn test_purge_deletes_rasters_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.tif"), 1234);
        touch(&dir.path().join("manifest/manifest.json"), 10);

        let report = purge_cache(dir.path(), false);
        assert_eq!(report.deleted_files, 1);
        assert_eq!(report.total_size_mb, 0.0);
        assert!(!dir.path().join("a.tif").exists());
        assert!(dir.path().join("manifest/manifest.json").exists());
    }
}
