//! Year grouping, per-group mosaic, clip and stacking.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use worldpop_common::{extract_year, GeometrySet, WorldPopResult};

use crate::clip::clip;
use crate::config::{MergeOptions, ReadOptions};
use crate::error::{MergeError, MergeResult};
use crate::merge::{align_to, mosaic};
use crate::reader::{GeoTiffReader, RasterSource};
use crate::types::{MergedRaster, Raster, RasterAttrs, RasterStack};

/// Turns cached per-country files into one mosaic or one per-year stack.
pub struct MergePipeline {
    source: Arc<dyn RasterSource>,
    read_options: ReadOptions,
}

impl Default for MergePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl MergePipeline {
    /// Pipeline reading GeoTIFFs with default read options.
    pub fn new() -> Self {
        Self {
            source: Arc::new(GeoTiffReader::new()),
            read_options: ReadOptions::default(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn RasterSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_read_options(mut self, read_options: ReadOptions) -> Self {
        self.read_options = read_options;
        self
    }

    pub fn read_options(&self) -> &ReadOptions {
        &self.read_options
    }

    /// Merge `paths` into one result.
    ///
    /// Without `years` every file goes into a single mosaic. With `years`
    /// files are grouped by the year in their name, each group is merged on
    /// its own, and the mosaics are stacked in ascending year order. Clipping
    /// is applied to each mosaic after merging.
    #[instrument(skip(self, paths, options, clip_geometry), fields(files = paths.len()))]
    pub fn merge(
        &self,
        paths: &[PathBuf],
        years: Option<&[i32]>,
        options: &MergeOptions,
        clip_geometry: Option<&GeometrySet>,
    ) -> WorldPopResult<MergedRaster> {
        options.validate().map_err(MergeError::InvalidRaster)?;

        let merged = match years {
            None => {
                let raster = self.merge_group(paths, options, clip_geometry)?;
                info!(width = raster.width, height = raster.height, "Merged static product");
                MergedRaster::Single(raster)
            }
            Some(years) => {
                MergedRaster::Stack(self.merge_years(paths, years, options, clip_geometry)?)
            }
        };
        Ok(merged)
    }

    fn merge_years(
        &self,
        paths: &[PathBuf],
        years: &[i32],
        options: &MergeOptions,
        clip_geometry: Option<&GeometrySet>,
    ) -> MergeResult<RasterStack> {
        let groups = group_by_year(paths)?;

        let mut wanted: Vec<i32> = years.to_vec();
        wanted.sort_unstable();
        wanted.dedup();
        if wanted.is_empty() {
            return Err(MergeError::Grouping("no years requested".to_string()));
        }

        let mut layers: Vec<Raster> = Vec::with_capacity(wanted.len());
        for year in &wanted {
            let group = groups.get(year).ok_or_else(|| {
                MergeError::Grouping(format!("no raster files found for year {year}"))
            })?;
            info!(year = year, files = group.len(), "Merging year");
            let mosaic = self.merge_group(group, options, clip_geometry)?;

            let layer = match layers.first() {
                Some(reference) => align_to(&mosaic, reference)?,
                None => mosaic,
            };
            layers.push(layer);
        }

        for (year, group) in &groups {
            if !wanted.contains(year) {
                debug!(year = year, files = group.len(), "Ignoring files for unrequested year");
            }
        }

        let attrs = RasterAttrs::shared(layers.iter().map(|l| &l.attrs));
        Ok(RasterStack {
            years: wanted,
            layers,
            attrs,
        })
    }

    /// Read, mosaic and optionally clip one group of files.
    fn merge_group(
        &self,
        paths: &[PathBuf],
        options: &MergeOptions,
        clip_geometry: Option<&GeometrySet>,
    ) -> MergeResult<Raster> {
        if paths.is_empty() {
            return Err(MergeError::Empty);
        }
        let rasters = paths
            .iter()
            .map(|path| self.source.read(path, &self.read_options))
            .collect::<MergeResult<Vec<_>>>()?;

        let mosaic = mosaic(&rasters, options)?;
        match clip_geometry {
            Some(geometry) => clip(&mosaic, geometry),
            None => Ok(mosaic),
        }
    }
}

/// Group file paths by the year token in their file name.
pub fn group_by_year(paths: &[PathBuf]) -> MergeResult<BTreeMap<i32, Vec<PathBuf>>> {
    let mut groups: BTreeMap<i32, Vec<PathBuf>> = BTreeMap::new();
    for path in paths {
        let year = file_year(path)?;
        groups.entry(year).or_default().push(path.clone());
    }
    Ok(groups)
}

fn file_year(path: &Path) -> MergeResult<i32> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MergeError::Grouping(format!("unusable file name {}", path.display())))?;
    extract_year(stem).map_err(|e| MergeError::Grouping(e.to_string()))
}
