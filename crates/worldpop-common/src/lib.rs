//! Common types and utilities shared across the WorldPop retrieval crates.

pub mod aoi;
pub mod bbox;
pub mod cache;
pub mod config;
pub mod crs;
pub mod error;
pub mod year;

pub use aoi::{AreaOfInterest, Coord, GeometrySet, NormalizedAoi, Polygon};
pub use bbox::{BboxError, BoundingBox};
pub use cache::{
    cache_file_name, is_temp_file, temp_path_for, FileDescriptor, RASTER_EXTENSION, TEMP_SUFFIX,
};
pub use config::WorldPopConfig;
pub use crs::{CrsCode, CrsError, Wgs84Transform};
pub use error::{WorldPopError, WorldPopResult};
pub use year::{
    extract_year, extract_year_until, looks_like_annual_name, product_kind, strip_year,
    ProductKind, YearError, FIRST_YEAR,
};
