//! Core raster types.

use serde::{Deserialize, Serialize};

use worldpop_common::{BoundingBox, CrsCode};

use crate::error::{MergeError, MergeResult};

/// Tolerance used when comparing grid geometry, as a fraction of a pixel.
const GRID_EPSILON: f64 = 1e-6;

/// North-up affine transform: pixel `(col, row)` has its top-left corner at
/// `(origin_x + col * pixel_width, origin_y - row * pixel_height)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Positive; rows grow southwards.
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// World coordinate of the centre of pixel `(col, row)`.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel position of a world coordinate.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    /// Extent covered by a `width` x `height` grid.
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        BoundingBox::new(
            self.origin_x,
            self.origin_y - height as f64 * self.pixel_height,
            self.origin_x + width as f64 * self.pixel_width,
            self.origin_y,
        )
    }

    /// Transform of the window starting at pixel `(col, row)`.
    pub fn offset(&self, col: usize, row: usize) -> Self {
        Self {
            origin_x: self.origin_x + col as f64 * self.pixel_width,
            origin_y: self.origin_y - row as f64 * self.pixel_height,
            ..*self
        }
    }

    fn approx_eq(&self, other: &GeoTransform) -> bool {
        let tol_x = self.pixel_width.abs() * GRID_EPSILON;
        let tol_y = self.pixel_height.abs() * GRID_EPSILON;
        (self.origin_x - other.origin_x).abs() <= tol_x
            && (self.origin_y - other.origin_y).abs() <= tol_y
            && (self.pixel_width - other.pixel_width).abs() <= tol_x
            && (self.pixel_height - other.pixel_height).abs() <= tol_y
    }
}

/// Encoding attributes carried alongside the pixel values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RasterAttrs {
    /// Value marking missing pixels (`_FillValue`).
    pub fill_value: Option<f64>,
    pub scale_factor: Option<f64>,
    pub add_offset: Option<f64>,
}

impl RasterAttrs {
    /// Attributes identical across every input; conflicting ones are dropped.
    pub fn shared<'a>(attrs: impl IntoIterator<Item = &'a RasterAttrs>) -> RasterAttrs {
        let mut iter = attrs.into_iter();
        let Some(first) = iter.next() else {
            return RasterAttrs::default();
        };
        iter.fold(*first, |acc, next| RasterAttrs {
            fill_value: keep_if_equal(acc.fill_value, next.fill_value),
            scale_factor: keep_if_equal(acc.scale_factor, next.scale_factor),
            add_offset: keep_if_equal(acc.add_offset, next.add_offset),
        })
    }

    /// Per attribute, the first value any input sets.
    pub fn first_present<'a>(attrs: impl IntoIterator<Item = &'a RasterAttrs>) -> RasterAttrs {
        attrs.into_iter().fold(RasterAttrs::default(), |acc, next| RasterAttrs {
            fill_value: acc.fill_value.or(next.fill_value),
            scale_factor: acc.scale_factor.or(next.scale_factor),
            add_offset: acc.add_offset.or(next.add_offset),
        })
    }
}

fn keep_if_equal(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    if same_attr(a, b) {
        a
    } else {
        None
    }
}

/// Attribute equality where NaN equals NaN.
fn same_attr(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => same_value(x, y),
        _ => false,
    }
}

pub(crate) fn same_value(x: f64, y: f64) -> bool {
    x == y || (x.is_nan() && y.is_nan())
}

/// A georeferenced raster held in memory as `f32`.
///
/// Bands are stored one after another, each in row-major order, top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub data: Vec<f32>,
    pub transform: GeoTransform,
    pub crs: CrsCode,
    pub attrs: RasterAttrs,
}

impl Raster {
    /// Create a raster, checking the buffer length against the dimensions.
    pub fn new(
        width: usize,
        height: usize,
        bands: usize,
        data: Vec<f32>,
        transform: GeoTransform,
        crs: CrsCode,
        attrs: RasterAttrs,
    ) -> MergeResult<Self> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(MergeError::invalid(format!(
                "raster dimensions must be non-zero, got {width}x{height}x{bands}"
            )));
        }
        if data.len() != width * height * bands {
            return Err(MergeError::invalid(format!(
                "expected {} values for {width}x{height}x{bands}, got {}",
                width * height * bands,
                data.len()
            )));
        }
        if !(transform.pixel_width > 0.0 && transform.pixel_height > 0.0) {
            return Err(MergeError::invalid("pixel size must be positive"));
        }
        Ok(Self {
            width,
            height,
            bands,
            data,
            transform,
            crs,
            attrs,
        })
    }

    /// Single-band raster.
    pub fn single_band(
        width: usize,
        height: usize,
        data: Vec<f32>,
        transform: GeoTransform,
        crs: CrsCode,
        attrs: RasterAttrs,
    ) -> MergeResult<Self> {
        Self::new(width, height, 1, data, transform, crs, attrs)
    }

    /// Values of one band.
    pub fn band(&self, band: usize) -> &[f32] {
        let size = self.width * self.height;
        &self.data[band * size..(band + 1) * size]
    }

    /// Value at a pixel, `None` outside the grid.
    pub fn get(&self, band: usize, col: usize, row: usize) -> Option<f32> {
        if band >= self.bands || col >= self.width || row >= self.height {
            return None;
        }
        self.data
            .get(band * self.width * self.height + row * self.width + col)
            .copied()
    }

    /// Value written into pixels without data.
    pub fn nodata(&self) -> f32 {
        self.attrs.fill_value.map(|v| v as f32).unwrap_or(f32::NAN)
    }

    /// Whether a value represents a missing pixel.
    pub fn is_nodata(&self, value: f32) -> bool {
        if value.is_nan() {
            return true;
        }
        self.attrs
            .fill_value
            .is_some_and(|fill| value == fill as f32)
    }

    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    pub fn resolution(&self) -> (f64, f64) {
        (self.transform.pixel_width, self.transform.pixel_height)
    }

    /// Number of pixels holding data, across all bands.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.is_nodata(**v)).count()
    }

    /// Whether both rasters share dimensions, transform and CRS.
    pub fn same_grid(&self, other: &Raster) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
            && self.transform.approx_eq(&other.transform)
    }
}

/// Per-year mosaics aligned on one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStack {
    /// Ascending; `layers[i]` holds `years[i]`.
    pub years: Vec<i32>,
    pub layers: Vec<Raster>,
    /// Attributes shared by every layer.
    pub attrs: RasterAttrs,
}

impl RasterStack {
    pub fn layer(&self, year: i32) -> Option<&Raster> {
        self.years
            .iter()
            .position(|y| *y == year)
            .and_then(|i| self.layers.get(i))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// `(years, bands, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        match self.layers.first() {
            Some(r) => (self.layers.len(), r.bands, r.height, r.width),
            None => (0, 0, 0, 0),
        }
    }
}

/// Outcome of a merge: one mosaic for a static product, a stack for an annual one.
#[derive(Debug, Clone, PartialEq)]
pub enum MergedRaster {
    Single(Raster),
    Stack(RasterStack),
}

impl MergedRaster {
    /// Layers with their year, `None` for a static mosaic.
    pub fn layers(&self) -> Vec<(Option<i32>, &Raster)> {
        match self {
            MergedRaster::Single(r) => vec![(None, r)],
            MergedRaster::Stack(s) => s
                .years
                .iter()
                .zip(&s.layers)
                .map(|(y, r)| (Some(*y), r))
                .collect(),
        }
    }

    pub fn as_single(&self) -> Option<&Raster> {
        match self {
            MergedRaster::Single(r) => Some(r),
            MergedRaster::Stack(_) => None,
        }
    }

    pub fn as_stack(&self) -> Option<&RasterStack> {
        match self {
            MergedRaster::Stack(s) => Some(s),
            MergedRaster::Single(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> GeoTransform {
        GeoTransform::new(10.0, 20.0, 0.5, 0.25)
    }

    #[test]
    fn test_pixel_center_and_back() {
        let t = transform();
        let (x, y) = t.pixel_center(2, 3);
        assert_eq!((x, y), (11.25, 19.125));
        let (col, row) = t.to_pixel(x, y);
        assert_eq!((col, row), (2.5, 3.5));
    }

    #[test]
    fn test_bounds() {
        let b = transform().bounds(4, 8);
        assert_eq!(b, BoundingBox::new(10.0, 18.0, 12.0, 20.0));
    }

    #[test]
    fn test_new_rejects_bad_buffer() {
        let err = Raster::single_band(
            2,
            2,
            vec![0.0; 3],
            transform(),
            CrsCode::WGS84,
            RasterAttrs::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::InvalidRaster(_)));
    }

    #[test]
    fn test_nodata_detection() {
        let attrs = RasterAttrs {
            fill_value: Some(-99999.0),
            ..Default::default()
        };
        let r = Raster::single_band(
            2,
            1,
            vec![-99999.0, 3.0],
            transform(),
            CrsCode::WGS84,
            attrs,
        )
        .unwrap();
        assert!(r.is_nodata(-99999.0));
        assert!(r.is_nodata(f32::NAN));
        assert!(!r.is_nodata(3.0));
        assert_eq!(r.valid_count(), 1);
        assert_eq!(r.nodata(), -99999.0);
    }

    #[test]
    fn test_shared_attrs_drop_conflicts() {
        let a = RasterAttrs {
            fill_value: Some(-99999.0),
            scale_factor: Some(1.0),
            add_offset: None,
        };
        let b = RasterAttrs {
            fill_value: Some(-1.0),
            scale_factor: Some(1.0),
            add_offset: None,
        };
        let shared = RasterAttrs::shared([&a, &b]);
        assert_eq!(shared.fill_value, None);
        assert_eq!(shared.scale_factor, Some(1.0));
    }
}
