//! Local manifest cache kept in sync with the remote catalog by content hash.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use worldpop_common::{WorldPopConfig, WorldPopError, WorldPopResult};

use crate::entry::{parse_catalog, ManifestEntry};
use crate::manifest::Manifest;
use crate::source::{CatalogSource, HttpCatalogSource, DEFAULT_BASE_URL};

/// File name of the cleaned manifest table.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of the MD5 of the raw catalog the table was built from.
pub const HASH_FILE: &str = "raw_manifest_hash.txt";

/// What a staleness check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Local hash matched the published one; nothing was downloaded.
    UpToDate,
    /// The catalog was downloaded and the local table rebuilt.
    Refreshed { entries: usize, hash: String },
    /// The published hash could not be fetched; the existing table was kept.
    KeptStale { reason: String },
}

/// Loads, validates and caches the WorldPop manifest.
///
/// The validated manifest is memoized for the lifetime of the store. Use
/// [`ManifestStore::force_refresh`] to rebuild it from the remote catalog or
/// [`ManifestStore::invalidate`] to drop the in-memory copy.
pub struct ManifestStore {
    dir: PathBuf,
    source: Arc<dyn CatalogSource>,
    loaded: Mutex<Option<Arc<Manifest>>>,
}

impl ManifestStore {
    /// Create a store persisting into `dir`.
    pub fn new(dir: impl Into<PathBuf>, source: Arc<dyn CatalogSource>) -> Self {
        Self {
            dir: dir.into(),
            source,
            loaded: Mutex::new(None),
        }
    }

    /// Store under the configured cache root, reading from the WorldPop data host.
    pub fn from_config(config: &WorldPopConfig) -> WorldPopResult<Self> {
        let source = HttpCatalogSource::new(DEFAULT_BASE_URL)?;
        Ok(Self::new(config.manifest_dir(), Arc::new(source)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn table_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    fn hash_path(&self) -> PathBuf {
        self.dir.join(HASH_FILE)
    }

    /// The current manifest, refreshing the local table first if it is stale.
    pub async fn load(&self) -> WorldPopResult<Arc<Manifest>> {
        let mut loaded = self.loaded.lock().await;
        if let Some(manifest) = loaded.as_ref() {
            return Ok(Arc::clone(manifest));
        }

        self.refresh_if_stale(false).await?;
        let manifest = Arc::new(self.read_table()?);
        *loaded = Some(Arc::clone(&manifest));
        Ok(manifest)
    }

    /// Rebuild the local table from the remote catalog and replace the in-memory copy.
    pub async fn force_refresh(&self) -> WorldPopResult<Arc<Manifest>> {
        let mut loaded = self.loaded.lock().await;
        self.refresh_if_stale(true).await?;
        let manifest = Arc::new(self.read_table()?);
        *loaded = Some(Arc::clone(&manifest));
        Ok(manifest)
    }

    /// Drop the in-memory manifest; the next `load` re-reads and re-checks.
    pub async fn invalidate(&self) {
        *self.loaded.lock().await = None;
    }

    /// Compare the published hash with the local one and rebuild the table if
    /// they differ, the local files are missing, or `force` is set.
    ///
    /// When the hashes match only the small hash file is transferred.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn refresh_if_stale(&self, force: bool) -> WorldPopResult<RefreshOutcome> {
        let table_exists = self.table_path().is_file();
        let local_hash = if table_exists && !force {
            self.read_local_hash()?
        } else {
            None
        };

        let published = match self.source.fetch_hash().await {
            Ok(hash) => hash,
            Err(e @ WorldPopError::TransientNetwork { .. }) if local_hash.is_some() => {
                warn!(error = %e, "Could not check catalog hash, using cached manifest");
                return Ok(RefreshOutcome::KeptStale {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        if local_hash.as_deref() == Some(published.as_str()) {
            debug!(hash = %published, "Manifest is up to date");
            return Ok(RefreshOutcome::UpToDate);
        }

        info!(
            force = force,
            local_hash = ?local_hash,
            published_hash = %published,
            "Rebuilding manifest from remote catalog"
        );

        let body = self.source.fetch_catalog().await?;
        let digest = format!("{:x}", md5::compute(&body));
        if digest != published {
            return Err(WorldPopError::integrity(format!(
                "catalog digest {digest} does not match published hash {published}"
            )));
        }

        let entries = parse_catalog(&body)?;
        // Validate before persisting so a bad catalog never replaces a good table.
        let manifest = Manifest::new(entries)?;

        std::fs::create_dir_all(&self.dir)?;
        let table = serde_json::to_vec(manifest.entries())
            .map_err(|e| WorldPopError::integrity(format!("cannot serialize manifest ({e})")))?;
        write_atomic(&self.dir, &self.table_path(), &table)?;
        write_atomic(&self.dir, &self.hash_path(), digest.as_bytes())?;

        info!(entries = manifest.len(), hash = %digest, "Manifest refreshed");
        Ok(RefreshOutcome::Refreshed {
            entries: manifest.len(),
            hash: digest,
        })
    }

    fn read_local_hash(&self) -> WorldPopResult<Option<String>> {
        match std::fs::read_to_string(self.hash_path()) {
            Ok(content) => Ok(Some(content.trim().to_lowercase())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_table(&self) -> WorldPopResult<Manifest> {
        let path = self.table_path();
        let content = std::fs::read(&path)?;
        let entries: Vec<ManifestEntry> = serde_json::from_slice(&content).map_err(|e| {
            WorldPopError::integrity(format!(
                "cached manifest table {} is unreadable ({e}); run `worldpop manifest refresh --force`",
                path.display()
            ))
        })?;
        Manifest::new(entries)
    }
}

/// Write `contents` to `target` through a temporary file in `dir`.
fn write_atomic(dir: &Path, target: &Path, contents: &[u8]) -> WorldPopResult<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| WorldPopError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("hash.txt");
        write_atomic(dir.path(), &target, b"first").unwrap();
        write_atomic(dir.path(), &target, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
