//! Request types for the orchestration facade.

use serde::{Deserialize, Serialize};

use raster_merge::{MergeOptions, ReadOptions};
use worldpop_common::AreaOfInterest;

/// One product over one area of interest, optionally for several years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterRequest {
    /// Product name without a year token, e.g. `ppp` or `srtm_slope_100m`.
    pub product: String,
    pub area: AreaOfInterest,
    /// Required for annual products, absent for static ones.
    pub years: Option<Vec<i32>>,
    /// Keep downloaded files in the cache root; otherwise use a scratch directory.
    pub cache_downloads: bool,
    /// Reuse cached files instead of downloading them again.
    pub skip_download_if_exists: bool,
    pub merge: MergeOptions,
    pub read: ReadOptions,
}

impl RasterRequest {
    pub fn new(product: impl Into<String>, area: AreaOfInterest) -> Self {
        Self {
            product: product.into(),
            area,
            years: None,
            cache_downloads: true,
            skip_download_if_exists: true,
            merge: MergeOptions::default(),
            read: ReadOptions::default(),
        }
    }

    /// Request for a list of ISO3 country codes.
    pub fn countries<S: Into<String>>(
        product: impl Into<String>,
        codes: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            product,
            AreaOfInterest::Countries(codes.into_iter().map(Into::into).collect()),
        )
    }

    pub fn with_years(mut self, years: impl Into<Vec<i32>>) -> Self {
        self.years = Some(years.into());
        self
    }

    pub fn with_cache_downloads(mut self, cache: bool) -> Self {
        self.cache_downloads = cache;
        self
    }

    pub fn with_skip_download_if_exists(mut self, skip: bool) -> Self {
        self.skip_download_if_exists = skip;
        self
    }

    pub fn with_merge_options(mut self, merge: MergeOptions) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_read_options(mut self, read: ReadOptions) -> Self {
        self.read = read;
        self
    }
}
