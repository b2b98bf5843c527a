//! GeoTIFF decoding.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::debug;

use worldpop_common::CrsCode;

use crate::config::ReadOptions;
use crate::error::{MergeError, MergeResult};
use crate::types::{GeoTransform, Raster, RasterAttrs};

// GeoTIFF tag IDs (not in standard tiff crate)
pub(crate) const GEOTIFF_MODELPIXELSCALE: u16 = 33550;
pub(crate) const GEOTIFF_MODELTIEPOINT: u16 = 33922;
pub(crate) const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;

// GDAL private tags
pub(crate) const GDAL_METADATA: u16 = 42112;
pub(crate) const GDAL_NODATA: u16 = 42113;

// GeoKey IDs
pub(crate) const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
pub(crate) const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

static GDAL_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<Item\s+name="([^"]+)"([^>]*)>([^<]*)</Item>"#)
        .expect("GDAL metadata pattern is a valid regex")
});

/// Anything that can produce a [`Raster`] from a cached file.
pub trait RasterSource: Send + Sync {
    fn read(&self, path: &Path, options: &ReadOptions) -> MergeResult<Raster>;
}

/// Reads single- or multi-band GeoTIFFs with the `tiff` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffReader;

impl GeoTiffReader {
    pub fn new() -> Self {
        Self
    }
}

impl RasterSource for GeoTiffReader {
    fn read(&self, path: &Path, options: &ReadOptions) -> MergeResult<Raster> {
        let file = File::open(path).map_err(|e| MergeError::read(path, e))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| MergeError::read(path, e))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(|e| MergeError::read(path, e))?;
        let (width, height) = (width as usize, height as usize);
        let samples = decoder
            .find_tag(Tag::SamplesPerPixel)
            .map_err(|e| MergeError::read(path, e))?
            .map(|v| v.into_u32())
            .transpose()
            .map_err(|e| MergeError::read(path, e))?
            .unwrap_or(1) as usize;

        let transform = read_transform(&mut decoder).map_err(|e| MergeError::read(path, e))?;
        let crs = read_crs(&mut decoder).map_err(|e| MergeError::read(path, e))?;
        let mut attrs = read_attrs(&mut decoder).map_err(|e| MergeError::read(path, e))?;

        let image = decoder
            .read_image()
            .map_err(|e| MergeError::read(path, e))?;
        let interleaved = to_f32(image).ok_or_else(|| MergeError::read(path, "unsupported sample type"))?;
        let mut data = deinterleave(interleaved, samples);

        apply_read_options(&mut data, &mut attrs, options);

        debug!(
            path = %path.display(),
            width = width,
            height = height,
            bands = samples,
            crs = %crs,
            "Read raster"
        );

        Raster::new(width, height, samples, data, transform, crs, attrs)
            .map_err(|e| MergeError::read(path, e))
    }
}

type TagResult<T> = Result<T, String>;

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> TagResult<GeoTransform> {
    let scale = decoder
        .find_tag(Tag::Unknown(GEOTIFF_MODELPIXELSCALE))
        .map_err(|e| e.to_string())?
        .ok_or("missing ModelPixelScale tag")?
        .into_f64_vec()
        .map_err(|e| e.to_string())?;
    let tiepoint = decoder
        .find_tag(Tag::Unknown(GEOTIFF_MODELTIEPOINT))
        .map_err(|e| e.to_string())?
        .ok_or("missing ModelTiepoint tag")?
        .into_f64_vec()
        .map_err(|e| e.to_string())?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err("malformed georeferencing tags".to_string());
    }
    let (sx, sy) = (scale[0], scale[1]);
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);

    Ok(GeoTransform::new(x - i * sx, y + j * sy, sx, sy))
}

fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> TagResult<CrsCode> {
    let Some(keys) = decoder
        .find_tag(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY))
        .map_err(|e| e.to_string())?
    else {
        // WorldPop rasters are all geographic; a missing directory means WGS84.
        return Ok(CrsCode::WGS84);
    };
    let keys = keys.into_u32_vec().map_err(|e| e.to_string())?;

    // Header is 4 shorts, then 4 shorts per key.
    for entry in keys.get(4..).unwrap_or_default().chunks_exact(4) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        if id == GEOGRAPHIC_TYPE_GEO_KEY as u32 || id == PROJECTED_CS_TYPE_GEO_KEY as u32 {
            return CrsCode::from_epsg(value)
                .ok_or_else(|| format!("EPSG:{value} has no known projection definition"));
        }
    }
    Ok(CrsCode::WGS84)
}

fn read_attrs<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> TagResult<RasterAttrs> {
    let mut attrs = RasterAttrs::default();

    if let Some(nodata) = decoder
        .find_tag(Tag::Unknown(GDAL_NODATA))
        .map_err(|e| e.to_string())?
    {
        let text = nodata.into_string().map_err(|e| e.to_string())?;
        attrs.fill_value = parse_nodata(&text);
    }

    if let Some(metadata) = decoder
        .find_tag(Tag::Unknown(GDAL_METADATA))
        .map_err(|e| e.to_string())?
    {
        let xml = metadata.into_string().map_err(|e| e.to_string())?;
        let (scale, offset) = parse_gdal_metadata(&xml);
        attrs.scale_factor = scale;
        attrs.add_offset = offset;
    }

    Ok(attrs)
}

/// Parse a `GDAL_NODATA` string such as `-99999` or `nan`.
pub(crate) fn parse_nodata(text: &str) -> Option<f64> {
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    match text.to_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        other => other.parse().ok(),
    }
}

/// Scale and offset items of a `GDAL_METADATA` document.
pub(crate) fn parse_gdal_metadata(xml: &str) -> (Option<f64>, Option<f64>) {
    let mut scale = None;
    let mut offset = None;
    for caps in GDAL_ITEM.captures_iter(xml) {
        let name = caps[1].to_lowercase();
        let extra = caps[2].to_lowercase();
        let value = caps[3].trim().parse::<f64>().ok();
        if name == "scale" || name == "scale_factor" || extra.contains("role=\"scale\"") {
            scale = value;
        } else if name == "offset" || name == "add_offset" || extra.contains("role=\"offset\"") {
            offset = value;
        }
    }
    (scale, offset)
}

#[allow(unreachable_patterns)]
fn to_f32(image: DecodingResult) -> Option<Vec<f32>> {
    let values = match image {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => return None,
    };
    Some(values)
}

/// Pixel-interleaved samples to band-sequential order.
fn deinterleave(values: Vec<f32>, samples: usize) -> Vec<f32> {
    if samples <= 1 {
        return values;
    }
    let pixels = values.len() / samples;
    let mut out = vec![0.0f32; values.len()];
    for (i, chunk) in values.chunks_exact(samples).enumerate() {
        for (band, v) in chunk.iter().enumerate() {
            out[band * pixels + i] = *v;
        }
    }
    out
}

/// Apply masking and scaling in place, dropping the attributes they consume.
pub(crate) fn apply_read_options(data: &mut [f32], attrs: &mut RasterAttrs, options: &ReadOptions) {
    if options.masks() {
        if let Some(fill) = attrs.fill_value.take() {
            let fill = fill as f32;
            for v in data.iter_mut() {
                if *v == fill {
                    *v = f32::NAN;
                }
            }
        }
    }

    if options.mask_and_scale {
        let scale = attrs.scale_factor.take().unwrap_or(1.0) as f32;
        let offset = attrs.add_offset.take().unwrap_or(0.0) as f32;
        if scale != 1.0 || offset != 0.0 {
            for v in data.iter_mut() {
                *v = *v * scale + offset;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::assert_pixels_approx_eq;

    #[test]
    fn test_parse_nodata() {
        assert_eq!(parse_nodata("-99999"), Some(-99999.0));
        assert_eq!(parse_nodata(" -3.4e+38\0"), Some(-3.4e38));
        assert!(parse_nodata("nan").unwrap().is_nan());
        assert_eq!(parse_nodata("none"), None);
    }

    #[test]
    fn test_parse_gdal_metadata() {
        let xml = r#"<GDALMetadata>
  <Item name="SCALE" sample="0" role="scale">0.01</Item>
  <Item name="OFFSET" sample="0" role="offset">5</Item>
  <Item name="AREA_OR_POINT">Area</Item>
</GDALMetadata>"#;
        assert_eq!(parse_gdal_metadata(xml), (Some(0.01), Some(5.0)));
        assert_eq!(parse_gdal_metadata("<GDALMetadata></GDALMetadata>"), (None, None));
    }

    #[test]
    fn test_deinterleave() {
        let values = vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0];
        assert_eq!(deinterleave(values, 2), vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_masking_drops_fill_value() {
        let mut data = vec![-99999.0, 4.0];
        let mut attrs = RasterAttrs {
            fill_value: Some(-99999.0),
            scale_factor: Some(2.0),
            add_offset: None,
        };
        apply_read_options(&mut data, &mut attrs, &ReadOptions::masked());
        assert!(data[0].is_nan());
        assert_eq!(data[1], 4.0);
        assert_eq!(attrs.fill_value, None);
        assert_eq!(attrs.scale_factor, Some(2.0));
    }

    #[test]
    fn test_mask_and_scale() {
        let mut data = vec![-1.0, 4.0];
        let mut attrs = RasterAttrs {
            fill_value: Some(-1.0),
            scale_factor: Some(0.5),
            add_offset: Some(1.0),
        };
        apply_read_options(&mut data, &mut attrs, &ReadOptions::mask_and_scale());
        assert!(data[0].is_nan());
        assert_eq!(data[1], 3.0);
        assert_eq!(attrs, RasterAttrs::default());
    }

    #[test]
    fn test_mask_and_scale_integer_encoding() {
        let mut data = vec![0.0, 1234.0, 65535.0, 7.0];
        let mut attrs = RasterAttrs {
            fill_value: Some(65535.0),
            scale_factor: Some(0.01),
            add_offset: Some(-10.0),
        };
        apply_read_options(&mut data, &mut attrs, &ReadOptions::mask_and_scale());
        assert_pixels_approx_eq!(data, [-10.0, 2.34, f32::NAN, -9.93], 1e-4);
    }

    #[test]
    fn test_unmasked_read_keeps_everything() {
        let mut data = vec![-1.0, 4.0];
        let mut attrs = RasterAttrs {
            fill_value: Some(-1.0),
            ..Default::default()
        };
        apply_read_options(&mut data, &mut attrs, &ReadOptions::default());
        assert_eq!(data, vec![-1.0, 4.0]);
        assert_eq!(attrs.fill_value, Some(-1.0));
    }
}
