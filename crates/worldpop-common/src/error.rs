//! Error taxonomy shared by every WorldPop crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::year::ProductKind;

/// Result type alias using WorldPopError.
pub type WorldPopResult<T> = Result<T, WorldPopError>;

/// Maximum number of missing combinations spelled out in a coverage error.
const MAX_LISTED_MISSING: usize = 20;

/// Primary error type for manifest, resolution, download and merge operations.
#[derive(Debug, Error)]
pub enum WorldPopError {
    // === Catalog Errors ===
    #[error("Bad manifest: {0}. Force a manifest refresh; if the problem persists the upstream catalog has changed shape.")]
    Integrity(String),

    // === Query Errors ===
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error(
        "WorldPop has no data for the following country codes: {}. \
         List all available country codes with `worldpop manifest countries` \
         or `Manifest::iso_codes()`.",
        .codes.join(", ")
    )]
    UnknownCountry { codes: Vec<String> },

    #[error("{}", unknown_product_message(.product, .expected))]
    UnknownProduct { product: String, expected: ProductKind },

    #[error("{}", incomplete_coverage_message(.product, .missing))]
    IncompleteCoverage {
        product: String,
        missing: Vec<(String, Option<i32>)>,
    },

    // === Transfer Errors ===
    #[error("Download of {url} failed after {attempts} attempt(s): {message}")]
    TransientNetwork {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error(
        "{} download(s) failed: {}. Completed files are cached; run the same request again to retry.",
        .failures.len(),
        .failures.join("; ")
    )]
    Download { failures: Vec<String> },

    // === Raster Errors ===
    #[error(
        "Failed to read raster file at {}: {message}. If you suspect a corrupted cache, \
         delete the affected file and trigger the download again.",
        .path.display()
    )]
    RasterRead { path: PathBuf, message: String },

    #[error(
        "Country rasters do not use the same '{attribute}'. Request normalised reads \
         (set `mask_and_scale` in the read options) and try again."
    )]
    InconsistentRasterMetadata { attribute: String },

    #[error("No raster data inside the requested area: {0}")]
    NoDataInBounds(String),

    // === Infrastructure Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorldPopError {
    /// Create an Integrity error.
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Create an InvalidQuery error.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create a RasterRead error for the given file.
    pub fn raster_read(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::RasterRead {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create an InconsistentRasterMetadata error naming the conflicting attribute.
    pub fn inconsistent_metadata(attribute: impl Into<String>) -> Self {
        Self::InconsistentRasterMetadata {
            attribute: attribute.into(),
        }
    }

    /// Whether the caller must change the request to succeed.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            WorldPopError::InvalidQuery(_)
                | WorldPopError::UnknownCountry { .. }
                | WorldPopError::UnknownProduct { .. }
                | WorldPopError::IncompleteCoverage { .. }
                | WorldPopError::NoDataInBounds(_)
                | WorldPopError::Config(_)
        )
    }

    /// Process exit code used by the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            e if e.is_user_error() => 2,

            WorldPopError::Integrity(_)
            | WorldPopError::RasterRead { .. }
            | WorldPopError::InconsistentRasterMetadata { .. } => 3,

            WorldPopError::TransientNetwork { .. } | WorldPopError::Download { .. } => 4,

            _ => 1,
        }
    }
}

fn unknown_product_message(product: &str, expected: &ProductKind) -> String {
    match expected {
        ProductKind::Static => format!(
            "'{product}' is not a static data product in WorldPop. List all available \
             static data products with `worldpop manifest products --static`. For annual \
             data products, provide the years of interest as a separate argument."
        ),
        ProductKind::Annual => format!(
            "'{product}' is not an annual data product in WorldPop. List all available \
             annual data products with `worldpop manifest products --annual`. For static \
             data products, leave the years argument unset."
        ),
    }
}

fn incomplete_coverage_message(product: &str, missing: &[(String, Option<i32>)]) -> String {
    let mut listed: Vec<String> = missing
        .iter()
        .take(MAX_LISTED_MISSING)
        .map(|(iso3, year)| match year {
            Some(year) => format!("{iso3}/{year}"),
            None => iso3.clone(),
        })
        .collect();
    if missing.len() > MAX_LISTED_MISSING {
        listed.push(format!("... {} more", missing.len() - MAX_LISTED_MISSING));
    }

    format!(
        "The requested data product ('{product}') is not available for all requested \
         countries and years. Missing: {}. You can check data coverage using the full \
         WorldPop manifest (`worldpop manifest countries --product {product}`).",
        listed.join(", ")
    )
}
