//! Tests for area-of-interest normalization and geographic bounding boxes.

use worldpop_common::{
    AreaOfInterest, BoundingBox, Coord, CrsCode, GeometrySet, NormalizedAoi, Polygon,
    WorldPopError,
};

// ============================================================================
// Bounding box validation
// ============================================================================

#[test]
fn test_bbox_edges_of_the_world_are_valid() {
    assert!(BoundingBox::geographic(-180.0, -90.0, 180.0, 90.0).is_ok());
}

#[test]
fn test_bbox_latitude_order_message() {
    let err = BoundingBox::geographic(0.0, 10.0, 5.0, -10.0).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Bad bounding box. min_lat must be less than max_lat."
    );
}

#[test]
fn test_bbox_longitude_range_message() {
    let err = BoundingBox::geographic(-200.0, 0.0, 5.0, 10.0).unwrap_err();
    assert!(err.to_string().contains("between -180 and 180"));
}

#[test]
fn test_bbox_error_converts_to_invalid_query() {
    let err: WorldPopError = BoundingBox::geographic(0.0, 0.0, 0.0, 1.0)
        .unwrap_err()
        .into();
    assert!(matches!(err, WorldPopError::InvalidQuery(_)));
    assert_eq!(err.exit_code(), 2);
}

// ============================================================================
// Country lists
// ============================================================================

#[test]
fn test_single_country_shorthand() {
    let aoi = AreaOfInterest::country("nzl");
    assert_eq!(
        aoi.normalize().unwrap(),
        NormalizedAoi::Countries(vec!["NZL".to_string()])
    );
}

#[test]
fn test_blank_country_code_rejected() {
    let aoi = AreaOfInterest::Countries(vec!["COD".to_string(), "  ".to_string()]);
    assert!(matches!(
        aoi.normalize(),
        Err(WorldPopError::InvalidQuery(_))
    ));
}

#[test]
fn test_countries_have_no_clip_geometry() {
    let normalized = AreaOfInterest::country("COD").normalize().unwrap();
    assert!(normalized.clip_geometry().is_none());
}

// ============================================================================
// Geometry sets
// ============================================================================

#[test]
fn test_empty_geometry_set_rejected() {
    let aoi = AreaOfInterest::Geometries(GeometrySet::new(CrsCode::WGS84, vec![]));
    assert!(aoi.normalize().is_err());
}

#[test]
fn test_nad83_is_close_to_wgs84() {
    let polygon = Polygon::new(
        vec![
            Coord::new(-100.0, 30.0),
            Coord::new(-90.0, 30.0),
            Coord::new(-90.0, 40.0),
        ],
        vec![],
    );
    let aoi = AreaOfInterest::Geometries(GeometrySet::new(CrsCode::NAD83, vec![polygon]));
    let normalized = aoi.normalize().unwrap();
    let clip = normalized.clip_geometry().unwrap();
    assert_eq!(clip.crs, CrsCode::WGS84);
    let first = clip.polygons[0].exterior[0];
    assert!((first.x + 100.0).abs() < 1e-6 && (first.y - 30.0).abs() < 1e-6);
}

#[test]
fn test_projected_geometry_normalizes_to_wgs84() {
    // EPSG:3035 false origin is 10E 52N.
    let laea = CrsCode::parse("EPSG:3035").unwrap();
    let polygon = Polygon::new(
        vec![
            Coord::new(4_311_000.0, 3_200_000.0),
            Coord::new(4_331_000.0, 3_200_000.0),
            Coord::new(4_331_000.0, 3_220_000.0),
            Coord::new(4_311_000.0, 3_220_000.0),
        ],
        vec![],
    );
    let aoi = AreaOfInterest::Geometries(GeometrySet::new(laea, vec![polygon]));
    let normalized = aoi.normalize().unwrap();
    let clip = normalized.clip_geometry().unwrap();
    assert_eq!(clip.crs, CrsCode::WGS84);
    assert!(clip.contains(10.0, 52.0));
    let bounds = clip.bounds().unwrap();
    assert!(bounds.min_x > 9.8 && bounds.max_x < 10.2);
    assert!(bounds.min_y > 51.8 && bounds.max_y < 52.2);
}

#[test]
fn test_geometry_crs_deserializes_from_epsg_string() {
    let json = r#"{"crs":"EPSG:32633","polygons":[]}"#;
    let set: GeometrySet = serde_json::from_str(json).unwrap();
    assert_eq!(set.crs.epsg(), 32633);
    assert!(serde_json::from_str::<GeometrySet>(r#"{"crs":"EPSG:99999","polygons":[]}"#).is_err());
}

#[test]
fn test_geometry_bounds_span_all_polygons() {
    let a = Polygon::from_bbox(&BoundingBox::new(0.0, 0.0, 1.0, 1.0));
    let b = Polygon::from_bbox(&BoundingBox::new(5.0, -3.0, 6.0, 2.0));
    let set = GeometrySet::new(CrsCode::WGS84, vec![a, b]);
    assert_eq!(set.bounds(), Some(BoundingBox::new(0.0, -3.0, 6.0, 2.0)));
    assert!(set.contains(5.5, 0.0));
    assert!(!set.contains(3.0, 0.5));
}

#[test]
fn test_aoi_serde_tagging() {
    let aoi = AreaOfInterest::Countries(vec!["COD".to_string()]);
    let json = serde_json::to_string(&aoi).unwrap();
    assert_eq!(json, r#"{"type":"countries","value":["COD"]}"#);
}
