//! Raster Merge Pipeline for cached WorldPop country rasters.
//!
//! Country tiles are read from GeoTIFF, checked for consistent encoding
//! attributes, mosaicked onto one grid, optionally clipped to the exact area
//! of interest, and, for annual products, stacked along a year axis.
//!
//! # Architecture
//!
//! ```text
//! cached paths
//!      │
//!      ├─► group by year (annual products only)
//!      │
//!      ├─► RasterSource::read  (GeoTiffReader)
//!      │
//!      ├─► check_consistency   (_FillValue, scale_factor, CRS, bands)
//!      │
//!      ├─► mosaic              (nearest neighbour onto the union grid)
//!      │
//!      ├─► clip                (pixel centres inside the geometry)
//!      │
//!      └─► align + stack       (one layer per year)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use raster_merge::{MergeOptions, MergePipeline};
//!
//! let merged = MergePipeline::new().merge(&paths, Some(&[2019, 2020]), &MergeOptions::default(), None)?;
//! ```

pub mod clip;
pub mod config;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod reader;
pub mod types;
pub mod writer;

pub use clip::clip;
pub use config::{MergeMethod, MergeOptions, ReadOptions};
pub use error::{MergeError, MergeResult};
pub use merge::{align_to, check_consistency, mosaic, FILL_VALUE_ATTR, SCALE_FACTOR_ATTR};
pub use pipeline::{group_by_year, MergePipeline};
pub use reader::{GeoTiffReader, RasterSource};
pub use types::{GeoTransform, MergedRaster, Raster, RasterAttrs, RasterStack};
pub use writer::GeoTiffWriter;
