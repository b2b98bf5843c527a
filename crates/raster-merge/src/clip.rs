//! Clipping a mosaic to an exact area of interest.

use tracing::debug;

use worldpop_common::GeometrySet;

use crate::error::{MergeError, MergeResult};
use crate::types::Raster;

/// Keep pixels whose centre falls inside `geometry` and crop to their extent.
///
/// Pixel centres are converted to WGS84 before the containment test, so the
/// raster and the geometry may be in any EPSG CRS. Pixels outside the
/// geometry, or without a WGS84 position, become no-data.
pub fn clip(raster: &Raster, geometry: &GeometrySet) -> MergeResult<Raster> {
    let geometry = geometry.to_wgs84().map_err(MergeError::projection)?;
    let to_wgs84 = raster.crs.wgs84_transform().map_err(MergeError::projection)?;
    let Some(extent) = geometry.bounds() else {
        return Err(MergeError::NoDataInBounds("clip geometry is empty".to_string()));
    };

    let mut inside = vec![false; raster.width * raster.height];
    let mut col_range: Option<(usize, usize)> = None;
    let mut row_range: Option<(usize, usize)> = None;

    for row in 0..raster.height {
        for col in 0..raster.width {
            let (x, y) = raster.transform.pixel_center(col, row);
            let Ok((lon, lat)) = to_wgs84.transform(x, y) else {
                continue;
            };
            if !extent.contains_point(lon, lat) || !geometry.contains(lon, lat) {
                continue;
            }
            inside[row * raster.width + col] = true;
            col_range = Some(col_range.map_or((col, col), |(a, b)| (a.min(col), b.max(col))));
            row_range = Some(row_range.map_or((row, row), |(a, b)| (a.min(row), b.max(row))));
        }
    }

    let (Some((c0, c1)), Some((r0, r1))) = (col_range, row_range) else {
        let b = raster.bounds();
        return Err(MergeError::NoDataInBounds(format!(
            "geometry extent ({:.4}, {:.4}, {:.4}, {:.4}) misses raster extent ({:.4}, {:.4}, {:.4}, {:.4})",
            extent.min_x, extent.min_y, extent.max_x, extent.max_y, b.min_x, b.min_y, b.max_x, b.max_y
        )));
    };

    let width = c1 - c0 + 1;
    let height = r1 - r0 + 1;
    let nodata = raster.nodata();
    let mut data = Vec::with_capacity(width * height * raster.bands);
    for band in 0..raster.bands {
        let values = raster.band(band);
        for row in r0..=r1 {
            for col in c0..=c1 {
                let idx = row * raster.width + col;
                data.push(if inside[idx] { values[idx] } else { nodata });
            }
        }
    }

    debug!(
        from_width = raster.width,
        from_height = raster.height,
        width = width,
        height = height,
        "Clipped raster"
    );

    Raster::new(
        width,
        height,
        raster.bands,
        data,
        raster.transform.offset(c0, r0),
        raster.crs,
        raster.attrs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, RasterAttrs};
    use worldpop_common::{BoundingBox, Coord, CrsCode, Polygon};

    fn grid() -> Raster {
        // 10 x 10 one-degree pixels covering (0, 0) .. (10, 10)
        let data = test_utils::create_index_grid(10, 10);
        Raster::single_band(
            10,
            10,
            data,
            GeoTransform::new(0.0, 10.0, 1.0, 1.0),
            CrsCode::WGS84,
            RasterAttrs {
                fill_value: Some(-99999.0),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn wgs84(polygons: Vec<Polygon>) -> GeometrySet {
        GeometrySet::new(CrsCode::WGS84, polygons)
    }

    #[test]
    fn test_bbox_clip_crops() {
        let geom = wgs84(vec![Polygon::from_bbox(&BoundingBox::new(2.0, 3.0, 5.0, 6.0))]);
        let clipped = clip(&grid(), &geom).unwrap();
        assert_eq!((clipped.width, clipped.height), (3, 3));
        assert_eq!(clipped.transform.origin_x, 2.0);
        assert_eq!(clipped.transform.origin_y, 6.0);
        assert_eq!(clipped.valid_count(), 9);
        // Top-left of the crop is column 2, row 4 of the source.
        assert_eq!(clipped.get(0, 0, 0), Some(42.0));
        assert_eq!(clipped.get(0, 2, 2), Some(64.0));
    }

    #[test]
    fn test_triangle_masks_outside_pixels() {
        let triangle = Polygon::new(
            vec![
                Coord::new(0.0, 0.0),
                Coord::new(4.0, 0.0),
                Coord::new(0.0, 4.0),
                Coord::new(0.0, 0.0),
            ],
            vec![],
        );
        let clipped = clip(&grid(), &wgs84(vec![triangle])).unwrap();
        assert_eq!((clipped.width, clipped.height), (3, 3));
        // Centres (x + 0.5, y + 0.5) with x + y + 1 < 4: 3 + 2 + 1 pixels.
        assert_eq!(clipped.valid_count(), 6);
        // Top-right corner of the crop lies outside the triangle.
        assert!(clipped.is_nodata(clipped.get(0, 2, 0).unwrap()));
    }

    #[test]
    fn test_hole_is_excluded() {
        let outer = vec![
            Coord::new(0.0, 0.0),
            Coord::new(6.0, 0.0),
            Coord::new(6.0, 6.0),
            Coord::new(0.0, 6.0),
            Coord::new(0.0, 0.0),
        ];
        let hole = vec![
            Coord::new(2.0, 2.0),
            Coord::new(4.0, 2.0),
            Coord::new(4.0, 4.0),
            Coord::new(2.0, 4.0),
            Coord::new(2.0, 2.0),
        ];
        let clipped = clip(&grid(), &wgs84(vec![Polygon::new(outer, vec![hole])])).unwrap();
        assert_eq!((clipped.width, clipped.height), (6, 6));
        assert_eq!(clipped.valid_count(), 36 - 4);
    }

    #[test]
    fn test_projected_geometry_clips_geographic_raster() {
        // 200 km UTM 31N square spanning roughly 2.1..3.9E, 0.9..2.7N.
        let utm = CrsCode::parse("EPSG:32631").unwrap();
        let square = Polygon::new(
            vec![
                Coord::new(400_000.0, 100_000.0),
                Coord::new(600_000.0, 100_000.0),
                Coord::new(600_000.0, 300_000.0),
                Coord::new(400_000.0, 300_000.0),
            ],
            vec![],
        );
        let clipped = clip(&grid(), &GeometrySet::new(utm, vec![square])).unwrap();
        assert_eq!((clipped.width, clipped.height), (2, 2));
        assert_eq!(clipped.transform.origin_x, 2.0);
        assert_eq!(clipped.transform.origin_y, 3.0);
        assert_eq!(clipped.valid_count(), 4);
    }

    #[test]
    fn test_projected_raster_is_clipped_in_wgs84() {
        // 10 x 10 one-kilometre pixels east of the UTM 33N central meridian.
        let utm = CrsCode::parse("EPSG:32633").unwrap();
        let raster = Raster::single_band(
            10,
            10,
            test_utils::create_index_grid(10, 10),
            GeoTransform::new(500_000.0, 10_000.0, 1_000.0, 1_000.0),
            utm,
            RasterAttrs::default(),
        )
        .unwrap();
        // 0.045 degrees is about 5 km in both directions.
        let geom = wgs84(vec![Polygon::from_bbox(&BoundingBox::new(15.0, 0.0, 15.045, 0.045))]);
        let clipped = clip(&raster, &geom).unwrap();
        assert_eq!(clipped.crs, utm);
        assert_eq!((clipped.width, clipped.height), (5, 5));
        assert_eq!(clipped.transform.origin_x, 500_000.0);
        assert_eq!(clipped.transform.origin_y, 5_000.0);
    }

    #[test]
    fn test_disjoint_geometry_has_no_data() {
        let geom = wgs84(vec![Polygon::from_bbox(&BoundingBox::new(50.0, 50.0, 60.0, 60.0))]);
        let err = clip(&grid(), &geom).unwrap_err();
        assert!(matches!(err, MergeError::NoDataInBounds(_)));
    }
}
