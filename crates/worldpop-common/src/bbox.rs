//! Axis-aligned extents for areas of interest and raster footprints.

use serde::{Deserialize, Serialize};

/// Axis-aligned extent in the units of its CRS.
///
/// Areas of interest are always geographic `(min_lon, min_lat, max_lon, max_lat)`;
/// raster footprints use the raster's own CRS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build a validated geographic bounding box from `(min_lon, min_lat, max_lon, max_lat)`.
    pub fn geographic(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Self, BboxError> {
        let bbox = Self::new(min_lon, min_lat, max_lon, max_lat);
        bbox.validate_geographic()?;
        Ok(bbox)
    }

    /// Parse a "min_lon,min_lat,max_lon,max_lat" string.
    pub fn from_csv_string(s: &str) -> Result<Self, BboxError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| BboxError::InvalidNumber(part.to_string()))?;
        }

        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }

    /// Check ordering and WGS84 ranges of a geographic bounding box.
    pub fn validate_geographic(&self) -> Result<(), BboxError> {
        let values = [self.min_x, self.min_y, self.max_x, self.max_y];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BboxError::NotFinite);
        }
        if self.min_x >= self.max_x {
            return Err(BboxError::Order("min_lon must be less than max_lon"));
        }
        if self.min_y >= self.max_y {
            return Err(BboxError::Order("min_lat must be less than max_lat"));
        }
        if !(-180.0..=180.0).contains(&self.min_x) || !(-180.0..=180.0).contains(&self.max_x) {
            return Err(BboxError::Range(
                "Longitude must be between -180 and 180 degrees",
            ));
        }
        if !(-90.0..=90.0).contains(&self.min_y) || !(-90.0..=90.0).contains(&self.max_y) {
            return Err(BboxError::Range("Latitude must be between -90 and 90 degrees"));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Overlap with a non-zero area; touching edges do not count.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Smallest bounding box covering both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Edges are inclusive.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BboxError {
    #[error("Invalid bounding box format: {0}. Expected 'min_lon,min_lat,max_lon,max_lat'")]
    InvalidFormat(String),

    #[error("Invalid number in bounding box: {0}")]
    InvalidNumber(String),

    #[error("Bad bounding box. Coordinates must be finite numbers.")]
    NotFinite,

    #[error("Bad bounding box. {0}.")]
    Order(&'static str),

    #[error("Bad bounding box. {0}.")]
    Range(&'static str),
}

impl From<BboxError> for crate::WorldPopError {
    fn from(err: BboxError) -> Self {
        crate::WorldPopError::InvalidQuery(err.to_string())
    }
}
