//! Request → resolve → fetch → merge.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tempfile::TempDir;
use tracing::{info, instrument, warn};

use downloader::{DownloadConfig, DownloadManager, DownloadPlan};
use manifest::{CountryLocator, ManifestStore, QueryResolver, Resolution};
use raster_merge::{MergedRaster, MergePipeline};
use worldpop_common::{FileDescriptor, WorldPopConfig, WorldPopError, WorldPopResult};

use crate::request::RasterRequest;

/// Dry-run view of a request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestPlan {
    pub product: String,
    pub countries: Vec<String>,
    pub years: Option<Vec<i32>>,
    pub downloads: DownloadPlan,
}

/// Entry point tying the manifest store, resolver, download engine and merge pipeline together.
pub struct WorldPop {
    config: WorldPopConfig,
    store: ManifestStore,
    locator: Option<Arc<dyn CountryLocator>>,
    download_config: DownloadConfig,
    downloads: DownloadManager,
}

impl WorldPop {
    /// Client reading the catalog and rasters from the WorldPop data host.
    pub fn new(config: WorldPopConfig) -> WorldPopResult<Self> {
        let store = ManifestStore::from_config(&config)?;
        let download_config = DownloadConfig::from_worldpop(&config);
        Self::with_parts(config, store, download_config)
    }

    /// Client configured from `WORLDPOP_CACHE_DIR` and `WORLDPOP_MAX_CONCURRENCY`.
    pub fn from_env() -> WorldPopResult<Self> {
        Self::new(WorldPopConfig::from_env()?)
    }

    /// Client with an explicit manifest store and download configuration.
    pub fn with_parts(
        config: WorldPopConfig,
        store: ManifestStore,
        download_config: DownloadConfig,
    ) -> WorldPopResult<Self> {
        let downloads = DownloadManager::new(download_config.clone())?;
        Ok(Self {
            config,
            store,
            locator: None,
            download_config,
            downloads,
        })
    }

    /// Enable bounding-box and polygon areas of interest.
    pub fn with_locator(mut self, locator: Arc<dyn CountryLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn config(&self) -> &WorldPopConfig {
        &self.config
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    /// Validate a request against the manifest and list the files it needs.
    pub async fn resolve(&self, request: &RasterRequest) -> WorldPopResult<Resolution> {
        let manifest = self.store.load().await?;
        let mut resolver = QueryResolver::new(manifest, &self.config.cache_dir);
        if let Some(locator) = &self.locator {
            resolver = resolver.with_locator(locator.clone());
        }
        resolver.resolve(&request.product, &request.area, request.years.as_deref())
    }

    /// Which files a request would download, without touching the network for rasters.
    pub async fn plan(&self, request: &RasterRequest) -> WorldPopResult<RequestPlan> {
        let resolution = self.resolve(request).await?;
        let downloads = self
            .downloads
            .plan(&resolution.files.descriptors(), request.skip_download_if_exists);
        Ok(RequestPlan {
            product: resolution.product_name,
            countries: resolution.countries,
            years: resolution.years,
            downloads,
        })
    }

    /// Resolve and materialize every file of a request in the cache root.
    #[instrument(skip(self, request), fields(product = %request.product))]
    pub async fn download(&self, request: &RasterRequest) -> WorldPopResult<Vec<PathBuf>> {
        let resolution = self.resolve(request).await?;
        info!(files = resolution.files.len(), "Resolved request");
        self.downloads
            .fetch(&resolution.files.descriptors(), request.skip_download_if_exists)
            .await
    }

    /// Resolve, download and merge a request into one raster or year stack.
    #[instrument(skip(self, request), fields(product = %request.product))]
    pub async fn raster(&self, request: &RasterRequest) -> WorldPopResult<MergedRaster> {
        let resolution = self.resolve(request).await?;
        info!(
            files = resolution.files.len(),
            countries = resolution.countries.len(),
            "Resolved request"
        );

        // Held until the merge is done when downloads are not cached.
        let mut scratch: Option<TempDir> = None;
        let paths = if request.cache_downloads {
            self.downloads
                .fetch(&resolution.files.descriptors(), request.skip_download_if_exists)
                .await?
        } else {
            if request.skip_download_if_exists {
                warn!("skip_download_if_exists has no effect when cache_downloads is false");
            }
            let dir = tempfile::tempdir()?;
            let files: Vec<FileDescriptor> = resolution
                .files
                .iter()
                .map(|f| f.descriptor.rebased(dir.path()))
                .collect();
            let manager = DownloadManager::new(DownloadConfig {
                cache_dir: dir.path().to_path_buf(),
                ..self.download_config.clone()
            })?;
            let paths = manager.fetch(&files, false).await?;
            scratch = Some(dir);
            paths
        };

        let years = resolution.years.clone();
        let clip = resolution.clip.clone();
        let options = request.merge.clone();
        let read = request.read;
        let merged = tokio::task::spawn_blocking(move || {
            MergePipeline::new().with_read_options(read).merge(
                &paths,
                years.as_deref(),
                &options,
                clip.as_ref(),
            )
        })
        .await
        .map_err(|e| WorldPopError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        drop(scratch);
        Ok(merged)
    }
}
