//! End-to-end merges over GeoTIFF files written to a temporary cache.

use std::path::{Path, PathBuf};

use raster_merge::{
    GeoTiffReader, GeoTiffWriter, GeoTransform, MergeOptions, MergePipeline, Raster, RasterAttrs,
    RasterSource, ReadOptions,
};
use test_utils::{create_constant_grid, create_grid_with_fill, create_population_grid};
use worldpop_common::{BoundingBox, CrsCode, GeometrySet, Polygon, WorldPopError};

const FILL: f64 = -99999.0;

/// Write a single-band tile with one-degree pixels whose top-left corner is `(x, y)`.
fn write_tile(dir: &Path, name: &str, x: f64, y: f64, data: Vec<f32>, fill: Option<f64>) -> PathBuf {
    let raster = Raster::single_band(
        4,
        4,
        data,
        GeoTransform::new(x, y, 1.0, 1.0),
        CrsCode::WGS84,
        RasterAttrs {
            fill_value: fill,
            ..Default::default()
        },
    )
    .unwrap();
    let path = dir.join(name);
    GeoTiffWriter::new().write(&raster, &path).unwrap();
    path
}

fn constant_tile(dir: &Path, name: &str, x: f64, value: f32) -> PathBuf {
    write_tile(dir, name, x, 4.0, create_constant_grid(4, 4, value), Some(FILL))
}

// ============================================================================
// Static products
// ============================================================================

#[test]
fn test_static_product_is_one_mosaic() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        constant_tile(dir.path(), "srtm_slope_100m_CAN.tif", 0.0, 1.0),
        constant_tile(dir.path(), "srtm_slope_100m_USA.tif", 4.0, 2.0),
    ];

    let merged = MergePipeline::new()
        .merge(&paths, None, &MergeOptions::default(), None)
        .unwrap();
    let raster = merged.as_single().expect("static products give a single mosaic");

    assert_eq!((raster.width, raster.height), (8, 4));
    assert_eq!(raster.bounds(), BoundingBox::new(0.0, 0.0, 8.0, 4.0));
    assert_eq!(raster.get(0, 0, 0), Some(1.0));
    assert_eq!(raster.get(0, 7, 3), Some(2.0));
    assert_eq!(raster.attrs.fill_value, Some(FILL));
}

#[test]
fn test_clip_is_applied_after_merge() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        constant_tile(dir.path(), "ppp_CAF.tif", 0.0, 1.0),
        constant_tile(dir.path(), "ppp_COD.tif", 4.0, 2.0),
    ];
    // Straddles the border between both tiles.
    let area = GeometrySet::new(
        CrsCode::WGS84,
        vec![Polygon::from_bbox(&BoundingBox::new(2.0, 1.0, 6.0, 3.0))],
    );

    let merged = MergePipeline::new()
        .merge(&paths, None, &MergeOptions::default(), Some(&area))
        .unwrap();
    let raster = merged.as_single().unwrap();

    assert_eq!((raster.width, raster.height), (4, 2));
    assert_eq!(raster.data, vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]);
}

#[test]
fn test_clip_outside_rasters_is_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![constant_tile(dir.path(), "ppp_NZL.tif", 0.0, 1.0)];
    let area = GeometrySet::new(
        CrsCode::WGS84,
        vec![Polygon::from_bbox(&BoundingBox::new(40.0, 40.0, 41.0, 41.0))],
    );

    let err = MergePipeline::new()
        .merge(&paths, None, &MergeOptions::default(), Some(&area))
        .unwrap_err();
    assert!(matches!(err, WorldPopError::NoDataInBounds(_)));
}

// ============================================================================
// Annual products
// ============================================================================

#[test]
fn test_annual_product_stacks_years() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        constant_tile(dir.path(), "ppp_COD_2019.tif", 0.0, 1.0),
        constant_tile(dir.path(), "ppp_CAF_2019.tif", 4.0, 2.0),
        constant_tile(dir.path(), "ppp_COD_2020.tif", 0.0, 3.0),
        constant_tile(dir.path(), "ppp_CAF_2020.tif", 4.0, 4.0),
    ];

    let merged = MergePipeline::new()
        .merge(&paths, Some(&[2020, 2019]), &MergeOptions::default(), None)
        .unwrap();
    let stack = merged.as_stack().expect("annual products give a stack");

    assert_eq!(stack.years, vec![2019, 2020]);
    assert_eq!(stack.shape(), (2, 1, 4, 8));
    let y2019 = stack.layer(2019).unwrap();
    let y2020 = stack.layer(2020).unwrap();
    assert!(y2019.same_grid(y2020));
    assert_eq!(y2019.get(0, 0, 0), Some(1.0));
    assert_eq!(y2019.get(0, 5, 0), Some(2.0));
    assert_eq!(y2020.get(0, 0, 0), Some(3.0));
    assert_eq!(y2020.get(0, 5, 0), Some(4.0));
    assert_eq!(stack.attrs.fill_value, Some(FILL));
}

#[test]
fn test_years_with_different_footprints_are_aligned() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        constant_tile(dir.path(), "ppp_COD_2019.tif", 0.0, 1.0),
        constant_tile(dir.path(), "ppp_CAF_2019.tif", 4.0, 2.0),
        constant_tile(dir.path(), "ppp_COD_2020.tif", 0.0, 3.0),
    ];

    let merged = MergePipeline::new()
        .merge(&paths, Some(&[2019, 2020]), &MergeOptions::default(), None)
        .unwrap();
    let stack = merged.as_stack().unwrap();

    let y2020 = stack.layer(2020).unwrap();
    assert_eq!((y2020.width, y2020.height), (8, 4));
    assert_eq!(y2020.get(0, 0, 0), Some(3.0));
    assert_eq!(y2020.get(0, 6, 0), Some(FILL as f32));
}

#[test]
fn test_conflicting_attributes_are_dropped_from_stack() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_tile(dir.path(), "ppp_COD_2019.tif", 0.0, 4.0, create_constant_grid(4, 4, 1.0), Some(FILL)),
        write_tile(dir.path(), "ppp_COD_2020.tif", 0.0, 4.0, create_constant_grid(4, 4, 1.0), Some(-1.0)),
    ];

    let merged = MergePipeline::new()
        .merge(&paths, Some(&[2019, 2020]), &MergeOptions::default(), None)
        .unwrap();
    let stack = merged.as_stack().unwrap();
    assert_eq!(stack.attrs.fill_value, None);
    assert_eq!(stack.layer(2020).unwrap().attrs.fill_value, Some(-1.0));
}

#[test]
fn test_missing_year_is_invalid_query() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![constant_tile(dir.path(), "ppp_COD_2019.tif", 0.0, 1.0)];

    let err = MergePipeline::new()
        .merge(&paths, Some(&[2019, 2020]), &MergeOptions::default(), None)
        .unwrap_err();
    assert!(matches!(err, WorldPopError::InvalidQuery(_)));
    assert!(err.to_string().contains("2020"));
}

// ============================================================================
// Failures and read options
// ============================================================================

#[test]
fn test_mismatched_fill_values_name_fill_value() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_tile(dir.path(), "ppp_COD_2020.tif", 0.0, 4.0, create_constant_grid(4, 4, 1.0), Some(FILL)),
        write_tile(dir.path(), "ppp_CAF_2020.tif", 4.0, 4.0, create_constant_grid(4, 4, 1.0), Some(-1.0)),
    ];

    let err = MergePipeline::new()
        .merge(&paths, Some(&[2020]), &MergeOptions::default(), None)
        .unwrap_err();
    match &err {
        WorldPopError::InconsistentRasterMetadata { attribute } => {
            assert_eq!(attribute, "_FillValue")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("mask_and_scale"));
}

#[test]
fn test_tile_without_fill_value_merges_with_filled_tile() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_tile(dir.path(), "ppp_COD_2020.tif", 0.0, 4.0, create_constant_grid(4, 4, 1.0), None),
        write_tile(
            dir.path(),
            "ppp_CAF_2020.tif",
            4.0,
            4.0,
            create_grid_with_fill(4, 4, FILL as f32, &[(1, 1)]),
            Some(FILL),
        ),
    ];

    let merged = MergePipeline::new()
        .merge(&paths, Some(&[2020]), &MergeOptions::default(), None)
        .unwrap();
    let layer = merged.as_stack().unwrap().layer(2020).unwrap().clone();

    assert_eq!(layer.attrs.fill_value, Some(FILL));
    assert_eq!(layer.get(0, 0, 0), Some(1.0));
    assert!(layer.is_nodata(layer.get(0, 5, 1).unwrap()));
    assert_eq!(layer.valid_count(), 32 - 1);
}

#[test]
fn test_masked_reads_normalize_fill_values() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_tile(
            dir.path(),
            "ppp_COD_2020.tif",
            0.0,
            4.0,
            create_grid_with_fill(4, 4, FILL as f32, &[(0, 0)]),
            Some(FILL),
        ),
        write_tile(
            dir.path(),
            "ppp_CAF_2020.tif",
            4.0,
            4.0,
            create_grid_with_fill(4, 4, -1.0, &[(3, 3)]),
            Some(-1.0),
        ),
    ];

    let merged = MergePipeline::new()
        .with_read_options(ReadOptions::masked())
        .merge(&paths, Some(&[2020]), &MergeOptions::default(), None)
        .unwrap();
    let layer = merged.as_stack().unwrap().layer(2020).unwrap().clone();

    assert_eq!(layer.attrs.fill_value, None);
    assert!(layer.get(0, 0, 0).unwrap().is_nan());
    assert!(layer.get(0, 7, 3).unwrap().is_nan());
    assert_eq!(layer.valid_count(), 32 - 2);
}

#[test]
fn test_corrupt_cache_entry_is_raster_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let good = constant_tile(dir.path(), "ppp_COD_2020.tif", 0.0, 1.0);
    let bad = dir.path().join("ppp_CAF_2020.tif");
    std::fs::write(&bad, b"II*\0 truncated").unwrap();

    let err = MergePipeline::new()
        .merge(&[good, bad.clone()], Some(&[2020]), &MergeOptions::default(), None)
        .unwrap_err();
    match &err {
        WorldPopError::RasterRead { path, .. } => assert_eq!(path, &bad),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("delete the affected file"));
}

#[test]
fn test_written_stack_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_tile(dir.path(), "ppp_COD_2019.tif", 0.0, 4.0, create_population_grid(4, 4, 50.0), Some(FILL)),
        write_tile(dir.path(), "ppp_COD_2020.tif", 0.0, 4.0, create_population_grid(4, 4, 80.0), Some(FILL)),
    ];
    let merged = MergePipeline::new()
        .merge(&paths, Some(&[2019, 2020]), &MergeOptions::default(), None)
        .unwrap();

    let out = dir.path().join("out/ppp_COD.tif");
    let written = GeoTiffWriter::new().write_merged(&merged, &out).unwrap();
    assert_eq!(
        written,
        vec![
            dir.path().join("out/ppp_COD_2019.tif"),
            dir.path().join("out/ppp_COD_2020.tif")
        ]
    );

    let back = GeoTiffReader::new()
        .read(&written[1], &ReadOptions::default())
        .unwrap();
    assert_eq!(&back, merged.as_stack().unwrap().layer(2020).unwrap());
}
