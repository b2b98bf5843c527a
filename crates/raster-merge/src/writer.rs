//! GeoTIFF encoding for merged rasters.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tracing::info;

use crate::error::{MergeError, MergeResult};
use crate::reader::{
    GDAL_METADATA, GDAL_NODATA, GEOGRAPHIC_TYPE_GEO_KEY, GEOTIFF_GEOKEYDIRECTORY,
    GEOTIFF_MODELPIXELSCALE, GEOTIFF_MODELTIEPOINT, PROJECTED_CS_TYPE_GEO_KEY,
};
use crate::types::{MergedRaster, Raster, RasterStack};

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Writes [`Raster`] values as uncompressed `f32` GeoTIFFs.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffWriter;

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self
    }

    /// Write one raster to `path`, replacing any existing file.
    pub fn write(&self, raster: &Raster, path: &Path) -> MergeResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MergeError::write(path, e))?;
        }
        let file = File::create(path).map_err(|e| MergeError::write(path, e))?;
        let mut writer = BufWriter::new(file);
        self.write_to(raster, &mut writer)
            .map_err(|e| MergeError::write(path, e))?;
        writer.flush().map_err(|e| MergeError::write(path, e))?;

        info!(
            path = %path.display(),
            width = raster.width,
            height = raster.height,
            bands = raster.bands,
            "Wrote raster"
        );
        Ok(())
    }

    /// Write each layer of a stack to `<dir>/<stem>_<year>.tif`.
    pub fn write_stack(&self, stack: &RasterStack, dir: &Path, stem: &str) -> MergeResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(stack.len());
        for (year, layer) in stack.years.iter().zip(&stack.layers) {
            let path = dir.join(format!("{stem}_{year}.tif"));
            self.write(layer, &path)?;
            paths.push(path);
        }
        Ok(paths)
    }

    /// Write a merge result: a single file for a mosaic, one file per year for a stack.
    ///
    /// For a stack, `path`'s stem gets the year appended.
    pub fn write_merged(&self, merged: &MergedRaster, path: &Path) -> MergeResult<Vec<PathBuf>> {
        match merged {
            MergedRaster::Single(raster) => {
                self.write(raster, path)?;
                Ok(vec![path.to_path_buf()])
            }
            MergedRaster::Stack(stack) => {
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("raster");
                self.write_stack(stack, dir, stem)
            }
        }
    }

    /// Encode a raster into any seekable sink.
    pub fn write_to<W: Write + Seek>(&self, raster: &Raster, sink: &mut W) -> Result<(), String> {
        let width = raster.width as u32;
        let height = raster.height as u32;
        let mut encoder = TiffEncoder::new(sink).map_err(|e| e.to_string())?;

        if raster.bands == 1 {
            let mut image = encoder
                .new_image::<Gray32Float>(width, height)
                .map_err(|e| e.to_string())?;
            write_geotiff_tags(image.encoder(), raster)?;
            image.write_data(&raster.data).map_err(|e| e.to_string())?;
            return Ok(());
        }

        // Arbitrary band counts go through the low-level directory API.
        let bands = raster.bands;
        let mut dir = encoder.image_directory().map_err(|e| e.to_string())?;
        let tiff_err = |e: tiff::TiffError| e.to_string();

        dir.write_tag(Tag::ImageWidth, width).map_err(tiff_err)?;
        dir.write_tag(Tag::ImageLength, height).map_err(tiff_err)?;
        dir.write_tag(Tag::BitsPerSample, vec![32u16; bands].as_slice())
            .map_err(tiff_err)?;
        dir.write_tag(Tag::Compression, 1u16).map_err(tiff_err)?;
        dir.write_tag(Tag::PhotometricInterpretation, 1u16)
            .map_err(tiff_err)?;
        dir.write_tag(Tag::SamplesPerPixel, bands as u16)
            .map_err(tiff_err)?;
        dir.write_tag(Tag::SampleFormat, vec![3u16; bands].as_slice())
            .map_err(tiff_err)?;
        dir.write_tag(Tag::PlanarConfiguration, 1u16).map_err(tiff_err)?;
        dir.write_tag(Tag::RowsPerStrip, height).map_err(tiff_err)?;
        dir.write_tag(Tag::ExtraSamples, vec![0u16; bands - 1].as_slice())
            .map_err(tiff_err)?;
        write_geotiff_tags(&mut dir, raster)?;

        let pixels = raster.width * raster.height;
        let mut bytes = Vec::with_capacity(raster.data.len() * 4);
        for i in 0..pixels {
            for band in 0..bands {
                bytes.extend_from_slice(&raster.data[band * pixels + i].to_le_bytes());
            }
        }
        let offset = dir.write_data(bytes.as_slice()).map_err(tiff_err)?;
        // Classic TIFF offsets are 32-bit.
        let offset = u32::try_from(offset).map_err(|_| "raster exceeds 4 GiB".to_string())?;
        dir.write_tag(Tag::StripOffsets, offset).map_err(tiff_err)?;
        dir.write_tag(Tag::StripByteCounts, bytes.len() as u32)
            .map_err(tiff_err)?;
        dir.finish().map_err(tiff_err)?;
        Ok(())
    }
}

fn write_geotiff_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<W, K>,
    raster: &Raster,
) -> Result<(), String> {
    let t = &raster.transform;
    let tiff_err = |e: tiff::TiffError| e.to_string();

    // ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
    let pixel_scale = [t.pixel_width, t.pixel_height, 0.0];
    dir.write_tag(Tag::Unknown(GEOTIFF_MODELPIXELSCALE), pixel_scale.as_slice())
        .map_err(tiff_err)?;

    // ModelTiepoint: pixel (0, 0) to the top-left corner
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    dir.write_tag(Tag::Unknown(GEOTIFF_MODELTIEPOINT), tiepoint.as_slice())
        .map_err(tiff_err)?;

    let geographic = raster.crs.is_geographic();
    let epsg = raster.crs.epsg() as u16;
    let keys: [u16; 16] = [
        1,
        1,
        0,
        3,
        GT_MODEL_TYPE_GEO_KEY,
        0,
        1,
        if geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        },
        GT_RASTER_TYPE_GEO_KEY,
        0,
        1,
        RASTER_PIXEL_IS_AREA,
        if geographic {
            GEOGRAPHIC_TYPE_GEO_KEY
        } else {
            PROJECTED_CS_TYPE_GEO_KEY
        },
        0,
        1,
        epsg,
    ];
    dir.write_tag(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY), keys.as_slice())
        .map_err(tiff_err)?;

    if let Some(fill) = raster.attrs.fill_value {
        let text = if fill.is_nan() {
            "nan".to_string()
        } else {
            fill.to_string()
        };
        dir.write_tag(Tag::Unknown(GDAL_NODATA), text.as_str())
            .map_err(tiff_err)?;
    }

    if raster.attrs.scale_factor.is_some() || raster.attrs.add_offset.is_some() {
        let mut xml = String::from("<GDALMetadata>");
        for band in 0..raster.bands {
            if let Some(scale) = raster.attrs.scale_factor {
                xml.push_str(&format!(
                    "<Item name=\"SCALE\" sample=\"{band}\" role=\"scale\">{scale}</Item>"
                ));
            }
            if let Some(offset) = raster.attrs.add_offset {
                xml.push_str(&format!(
                    "<Item name=\"OFFSET\" sample=\"{band}\" role=\"offset\">{offset}</Item>"
                ));
            }
        }
        xml.push_str("</GDALMetadata>");
        dir.write_tag(Tag::Unknown(GDAL_METADATA), xml.as_str())
            .map_err(tiff_err)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReadOptions;
    use crate::reader::{GeoTiffReader, RasterSource};
    use crate::types::{GeoTransform, RasterAttrs};
    use worldpop_common::CrsCode;

    fn raster(bands: usize, attrs: RasterAttrs) -> Raster {
        let (w, h) = (6, 4);
        let data: Vec<f32> = (0..w * h * bands).map(|i| i as f32).collect();
        Raster::new(
            w,
            h,
            bands,
            data,
            GeoTransform::new(20.0, 5.0, 0.5, 0.5),
            CrsCode::WGS84,
            attrs,
        )
        .unwrap()
    }

    #[test]
    fn test_single_band_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        let attrs = RasterAttrs {
            fill_value: Some(-99999.0),
            scale_factor: Some(0.5),
            add_offset: Some(2.0),
        };
        let original = raster(1, attrs);
        GeoTiffWriter::new().write(&original, &path).unwrap();

        let back = GeoTiffReader::new()
            .read(&path, &ReadOptions::default())
            .unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_multi_band_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.tif");
        let original = raster(3, RasterAttrs::default());
        GeoTiffWriter::new().write(&original, &path).unwrap();

        let back = GeoTiffReader::new()
            .read(&path, &ReadOptions::default())
            .unwrap();
        assert_eq!(back.bands, 3);
        assert_eq!(back.band(2), original.band(2));
    }

    #[test]
    fn test_projected_crs_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merc.tif");
        let mut original = raster(1, RasterAttrs::default());
        original.crs = CrsCode::WEB_MERCATOR;
        original.transform = GeoTransform::new(2_000_000.0, 600_000.0, 100.0, 100.0);
        GeoTiffWriter::new().write(&original, &path).unwrap();

        let back = GeoTiffReader::new()
            .read(&path, &ReadOptions::default())
            .unwrap();
        assert_eq!(back.crs, CrsCode::WEB_MERCATOR);
        assert_eq!(back.transform, original.transform);
    }

    #[test]
    fn test_utm_crs_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utm.tif");
        let mut original = raster(1, RasterAttrs::default());
        original.crs = CrsCode::parse("EPSG:32633").unwrap();
        original.transform = GeoTransform::new(500_000.0, 20_000.0, 100.0, 100.0);
        GeoTiffWriter::new().write(&original, &path).unwrap();

        let back = GeoTiffReader::new()
            .read(&path, &ReadOptions::default())
            .unwrap();
        assert_eq!(back.crs.epsg(), 32633);
        assert!(!back.crs.is_geographic());
    }
}
