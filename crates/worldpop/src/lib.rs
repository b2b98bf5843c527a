//! WorldPop dataset retrieval.
//!
//! [`WorldPop`] turns a product name, an area of interest and optional years
//! into a merged raster: the request is validated against the catalog, the
//! matching country files are downloaded into the local cache, and the cached
//! files are mosaicked, clipped and stacked by year.
//!
//! # Example
//!
//! ```ignore
//! use worldpop::{RasterRequest, WorldPop};
//!
//! let client = WorldPop::from_env()?;
//! let request = RasterRequest::countries("ppp", ["COD", "CAF"]).with_years(vec![2019, 2020]);
//! let stack = client.raster(&request).await?;
//! ```

pub mod client;
pub mod request;

pub use client::{RequestPlan, WorldPop};
pub use request::RasterRequest;

pub use downloader::{purge_cache, repair_cache, DownloadConfig, PurgeReport, RetryPolicy};
pub use manifest::{BoundsCountryLocator, CountryLocator, ManifestStore, Resolution};
pub use raster_merge::{
    GeoTiffWriter, MergeMethod, MergeOptions, MergedRaster, Raster, RasterStack, ReadOptions,
};
pub use worldpop_common::{
    AreaOfInterest, BoundingBox, CrsCode, GeometrySet, Polygon, WorldPopConfig, WorldPopError,
    WorldPopResult,
};
