//! Error types for raster reading, merging and writing.

use std::path::{Path, PathBuf};

use thiserror::Error;

use worldpop_common::WorldPopError;

/// Errors that can occur while assembling rasters.
#[derive(Error, Debug)]
pub enum MergeError {
    /// A raster file could not be opened or decoded.
    #[error("failed to read raster {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    /// Inputs of one merge group disagree on an attribute.
    #[error("rasters disagree on '{0}'")]
    InconsistentMetadata(String),

    /// Nothing was handed to a merge.
    #[error("no rasters to merge")]
    Empty,

    /// Raster dimensions or buffers do not line up.
    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    /// Input paths cannot be grouped by year.
    #[error("cannot group rasters by year: {0}")]
    Grouping(String),

    /// The clip geometry does not cover any pixel.
    #[error("clip geometry does not overlap the raster: {0}")]
    NoDataInBounds(String),

    /// A raster or clip geometry cannot be brought to WGS84.
    #[error("{0}")]
    Projection(String),

    /// A raster could not be encoded to disk.
    #[error("failed to write raster {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },
}

impl MergeError {
    /// Create a Read error for the given file.
    pub fn read(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Create a Write error for the given file.
    pub fn write(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Create a Projection error from a CRS failure.
    pub fn projection(err: worldpop_common::CrsError) -> Self {
        Self::Projection(err.to_string())
    }

    /// Create an InvalidRaster error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRaster(msg.into())
    }
}

impl From<MergeError> for WorldPopError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::Read { path, message } => WorldPopError::raster_read(path, message),
            MergeError::InconsistentMetadata(attribute) => {
                WorldPopError::inconsistent_metadata(attribute)
            }
            MergeError::NoDataInBounds(msg) => WorldPopError::NoDataInBounds(msg),
            MergeError::Empty | MergeError::Grouping(_) | MergeError::Projection(_) => {
                WorldPopError::invalid_query(err.to_string())
            }
            MergeError::InvalidRaster(msg) => WorldPopError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                msg,
            )),
            MergeError::Write { path, message } => WorldPopError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{}: {message}", path.display()),
            )),
        }
    }
}

/// Result type for raster operations.
pub type MergeResult<T> = std::result::Result<T, MergeError>;
