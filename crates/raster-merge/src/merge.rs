//! Mosaic of rasters sharing a CRS onto one output grid.

use tracing::debug;

use worldpop_common::BoundingBox;

use crate::config::MergeOptions;
use crate::error::{MergeError, MergeResult};
use crate::types::{same_value, GeoTransform, Raster, RasterAttrs};

/// Attribute names reported by the consistency check.
pub const FILL_VALUE_ATTR: &str = "_FillValue";
pub const SCALE_FACTOR_ATTR: &str = "scale_factor";

/// Fail unless every raster agrees on fill value, scale factor, CRS and band count.
///
/// `_FillValue` and `scale_factor` only have to agree among the rasters that
/// set them; a raster without the attribute never conflicts.
pub fn check_consistency(rasters: &[Raster]) -> MergeResult<()> {
    let Some(first) = rasters.first() else {
        return Ok(());
    };
    check_attr(rasters, FILL_VALUE_ATTR, |r| r.attrs.fill_value)?;
    check_attr(rasters, SCALE_FACTOR_ATTR, |r| r.attrs.scale_factor)?;
    for other in &rasters[1..] {
        if first.crs != other.crs {
            return Err(MergeError::InconsistentMetadata("crs".to_string()));
        }
        if first.bands != other.bands {
            return Err(MergeError::InconsistentMetadata("band count".to_string()));
        }
    }
    Ok(())
}

fn check_attr(
    rasters: &[Raster],
    name: &str,
    get: impl Fn(&Raster) -> Option<f64>,
) -> MergeResult<()> {
    let mut present = rasters.iter().filter_map(get);
    let Some(expected) = present.next() else {
        return Ok(());
    };
    if present.all(|value| same_value(expected, value)) {
        Ok(())
    } else {
        Err(MergeError::InconsistentMetadata(name.to_string()))
    }
}

/// Merge rasters into one mosaic.
///
/// Output pixels are sampled from each input by nearest neighbour at the
/// output pixel centre. Overlaps are resolved with `options.method`; each
/// output attribute is the first one set by any input.
pub fn mosaic(rasters: &[Raster], options: &MergeOptions) -> MergeResult<Raster> {
    let first = rasters.first().ok_or(MergeError::Empty)?;
    check_consistency(rasters)?;
    options.validate().map_err(MergeError::InvalidRaster)?;

    let (res_x, res_y) = options.resolution.unwrap_or_else(|| first.resolution());
    let bounds = options.bounds.unwrap_or_else(|| {
        rasters
            .iter()
            .map(Raster::bounds)
            .fold(first.bounds(), |acc, b| acc.union(&b))
    });

    let width = ((bounds.max_x - bounds.min_x) / res_x).round().max(1.0) as usize;
    let height = ((bounds.max_y - bounds.min_y) / res_y).round().max(1.0) as usize;
    let transform = GeoTransform::new(bounds.min_x, bounds.max_y, res_x, res_y);
    let bands = first.bands;
    let attrs = RasterAttrs::first_present(rasters.iter().map(|r| &r.attrs));
    let nodata = attrs.fill_value.map(|v| v as f32).unwrap_or(f32::NAN);
    let plane = width * height;

    let mut data = vec![nodata; plane * bands];
    let mut filled = vec![false; plane * bands];

    for raster in rasters {
        let Some((cols, rows)) = window(&transform, width, height, &raster.bounds()) else {
            continue;
        };
        for band in 0..bands {
            for row in rows.clone() {
                for col in cols.clone() {
                    let (x, y) = transform.pixel_center(col, row);
                    let (sc, sr) = raster.transform.to_pixel(x, y);
                    if sc < 0.0 || sr < 0.0 {
                        continue;
                    }
                    let Some(value) = raster.get(band, sc as usize, sr as usize) else {
                        continue;
                    };
                    if raster.is_nodata(value) {
                        continue;
                    }
                    let idx = band * plane + row * width + col;
                    data[idx] = if filled[idx] {
                        options.method.combine(data[idx], value)
                    } else {
                        value
                    };
                    filled[idx] = true;
                }
            }
        }
    }

    debug!(
        inputs = rasters.len(),
        width = width,
        height = height,
        method = ?options.method,
        "Merged mosaic"
    );

    Raster::new(
        width,
        height,
        bands,
        data,
        transform,
        first.crs,
        attrs,
    )
}

/// Resample a raster onto the grid of `target`.
pub fn align_to(raster: &Raster, target: &Raster) -> MergeResult<Raster> {
    if raster.same_grid(target) {
        return Ok(raster.clone());
    }
    let options = MergeOptions {
        resolution: Some(target.resolution()),
        bounds: Some(target.bounds()),
        ..MergeOptions::default()
    };
    let mut aligned = mosaic(std::slice::from_ref(raster), &options)?;
    // Rounding of the extent must not leave the grids one pixel apart.
    if aligned.width != target.width || aligned.height != target.height {
        return Err(MergeError::invalid(format!(
            "cannot align {}x{} raster onto {}x{} grid",
            aligned.width, aligned.height, target.width, target.height
        )));
    }
    aligned.transform = target.transform;
    Ok(aligned)
}

/// Output pixel ranges that may overlap `bounds`.
fn window(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    bounds: &BoundingBox,
) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let (c0, r0) = transform.to_pixel(bounds.min_x, bounds.max_y);
    let (c1, r1) = transform.to_pixel(bounds.max_x, bounds.min_y);
    let col_start = c0.floor().max(0.0) as usize;
    let row_start = r0.floor().max(0.0) as usize;
    let col_end = (c1.ceil().max(0.0) as usize).min(width);
    let row_end = (r1.ceil().max(0.0) as usize).min(height);
    if col_start >= col_end || row_start >= row_end {
        return None;
    }
    Some((col_start..col_end, row_start..row_end))
}
