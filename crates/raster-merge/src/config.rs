//! Read and merge options.

use serde::{Deserialize, Serialize};

use worldpop_common::BoundingBox;

/// How values are decoded from each raster file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Replace fill values with NaN and drop the `_FillValue` attribute.
    pub masked: bool,
    /// Mask, then apply `value * scale_factor + add_offset` and drop both attributes.
    pub mask_and_scale: bool,
}

impl ReadOptions {
    pub fn masked() -> Self {
        Self {
            masked: true,
            mask_and_scale: false,
        }
    }

    pub fn mask_and_scale() -> Self {
        Self {
            masked: true,
            mask_and_scale: true,
        }
    }

    /// Whether fill values are turned into NaN.
    pub fn masks(&self) -> bool {
        self.masked || self.mask_and_scale
    }
}

/// How overlapping valid pixels are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    /// Keep the value of the earliest input.
    #[default]
    First,
    /// Keep the value of the latest input.
    Last,
    Min,
    Max,
    Sum,
}

impl MergeMethod {
    /// Parse a method name (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "first" => Some(MergeMethod::First),
            "last" => Some(MergeMethod::Last),
            "min" => Some(MergeMethod::Min),
            "max" => Some(MergeMethod::Max),
            "sum" => Some(MergeMethod::Sum),
            _ => None,
        }
    }

    /// Combine an existing output value with a new valid input value.
    pub fn combine(&self, current: f32, incoming: f32) -> f32 {
        match self {
            MergeMethod::First => current,
            MergeMethod::Last => incoming,
            MergeMethod::Min => current.min(incoming),
            MergeMethod::Max => current.max(incoming),
            MergeMethod::Sum => current + incoming,
        }
    }
}

/// Mosaic parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeOptions {
    pub method: MergeMethod,
    /// Output pixel size `(x, y)` in CRS units; defaults to the first input's.
    pub resolution: Option<(f64, f64)>,
    /// Output extent in the rasters' CRS; defaults to the union of inputs.
    pub bounds: Option<BoundingBox>,
}

impl MergeOptions {
    pub fn with_method(mut self, method: MergeMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_resolution(mut self, x: f64, y: f64) -> Self {
        self.resolution = Some((x, y));
        self
    }

    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if let Some((x, y)) = self.resolution {
            if !(x.is_finite() && y.is_finite() && x > 0.0 && y > 0.0) {
                return Err(format!("resolution must be positive, got ({x}, {y})"));
            }
        }
        if let Some(b) = self.bounds {
            if !(b.min_x < b.max_x && b.min_y < b.max_y) {
                return Err("bounds must satisfy min < max on both axes".to_string());
            }
        }
        Ok(())
    }
}
