//! Area-of-interest variants and their normalization.
//!
//! A request names its area either by country codes, by a set of polygons in
//! any EPSG CRS, or by a geographic bounding box. Each variant has
//! its own normalization function; the result is either a clean country list or
//! a WGS84 geometry set that still needs country selection.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::crs::{CrsCode, CrsError};
use crate::error::{WorldPopError, WorldPopResult};

/// A single 2-D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Coord {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A polygon with one exterior ring and optional holes.
///
/// Rings may be given open or closed; the closing edge is implied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    #[serde(default)]
    pub interiors: Vec<Vec<Coord>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Coord>, interiors: Vec<Vec<Coord>>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    /// Axis-aligned rectangle covering `bbox`.
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Self::new(
            vec![
                Coord::new(bbox.min_x, bbox.min_y),
                Coord::new(bbox.max_x, bbox.min_y),
                Coord::new(bbox.max_x, bbox.max_y),
                Coord::new(bbox.min_x, bbox.max_y),
            ],
            Vec::new(),
        )
    }

    /// Point-in-polygon test; points inside a hole are outside the polygon.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if !ring_contains(&self.exterior, x, y) {
            return false;
        }
        !self.interiors.iter().any(|hole| ring_contains(hole, x, y))
    }

    /// Bounds of the exterior ring, or `None` for an empty ring.
    pub fn bounds(&self) -> Option<BoundingBox> {
        let first = self.exterior.first()?;
        let init = BoundingBox::new(first.x, first.y, first.x, first.y);
        Some(self.exterior.iter().fold(init, |acc, c| {
            BoundingBox::new(
                acc.min_x.min(c.x),
                acc.min_y.min(c.y),
                acc.max_x.max(c.x),
                acc.max_y.max(c.y),
            )
        }))
    }

    fn try_map_coords<E>(&self, f: impl Fn(Coord) -> Result<Coord, E>) -> Result<Polygon, E> {
        let map_ring = |ring: &[Coord]| ring.iter().copied().map(&f).collect::<Result<Vec<_>, E>>();
        Ok(Polygon {
            exterior: map_ring(&self.exterior)?,
            interiors: self
                .interiors
                .iter()
                .map(|ring| map_ring(ring))
                .collect::<Result<_, E>>()?,
        })
    }

    fn validate(&self) -> WorldPopResult<()> {
        let distinct = |ring: &[Coord]| {
            let closed = ring.len() > 1 && ring.first() == ring.last();
            ring.len() - usize::from(closed)
        };
        if distinct(&self.exterior) < 3 {
            return Err(WorldPopError::invalid_query(
                "Polygon exterior ring needs at least three distinct vertices",
            ));
        }
        if self.interiors.iter().any(|ring| distinct(ring) < 3) {
            return Err(WorldPopError::invalid_query(
                "Polygon interior ring needs at least three distinct vertices",
            ));
        }
        let all_finite = self
            .exterior
            .iter()
            .chain(self.interiors.iter().flatten())
            .all(|c| c.x.is_finite() && c.y.is_finite());
        if !all_finite {
            return Err(WorldPopError::invalid_query(
                "Polygon coordinates must be finite numbers",
            ));
        }
        Ok(())
    }
}

/// Even-odd ray casting against one ring.
fn ring_contains(ring: &[Coord], x: f64, y: f64) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > y) != (b.y > y) && x < (b.x - a.x) * (y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Polygons sharing one coordinate reference system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometrySet {
    pub crs: CrsCode,
    pub polygons: Vec<Polygon>,
}

impl GeometrySet {
    pub fn new(crs: CrsCode, polygons: Vec<Polygon>) -> Self {
        Self { crs, polygons }
    }

    /// Reproject every vertex to geographic WGS84.
    pub fn to_wgs84(&self) -> Result<GeometrySet, CrsError> {
        if self.crs == CrsCode::WGS84 {
            return Ok(self.clone());
        }
        let transform = self.crs.wgs84_transform()?;
        let polygons = self
            .polygons
            .iter()
            .map(|p| {
                p.try_map_coords(|c| {
                    let (x, y) = transform.transform(c.x, c.y)?;
                    Ok::<_, CrsError>(Coord::new(x, y))
                })
            })
            .collect::<Result<_, CrsError>>()?;
        Ok(GeometrySet {
            crs: CrsCode::WGS84,
            polygons,
        })
    }

    /// Union of polygon bounds.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.polygons
            .iter()
            .filter_map(Polygon::bounds)
            .reduce(|a, b| a.union(&b))
    }

    /// Whether any polygon contains the point.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons.iter().any(|p| p.contains(x, y))
    }
}

/// How a request describes the region it wants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AreaOfInterest {
    /// ISO 3166-1 alpha-3 country codes.
    Countries(Vec<String>),
    /// Polygons in any supported CRS.
    Geometries(GeometrySet),
    /// Geographic `(min_lon, min_lat, max_lon, max_lat)`.
    BoundingBox(BoundingBox),
}

/// Normalized form of an [`AreaOfInterest`].
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedAoi {
    /// Upper-cased, de-duplicated country codes in request order.
    Countries(Vec<String>),
    /// A WGS84 area; countries must still be selected spatially.
    Area(GeometrySet),
}

impl NormalizedAoi {
    /// The precise clip geometry, if the area was not given as countries.
    pub fn clip_geometry(&self) -> Option<&GeometrySet> {
        match self {
            NormalizedAoi::Countries(_) => None,
            NormalizedAoi::Area(geometry) => Some(geometry),
        }
    }
}

impl AreaOfInterest {
    /// Shorthand for a single country code.
    pub fn country(code: impl Into<String>) -> Self {
        AreaOfInterest::Countries(vec![code.into()])
    }

    pub fn normalize(&self) -> WorldPopResult<NormalizedAoi> {
        match self {
            AreaOfInterest::Countries(codes) => normalize_countries(codes),
            AreaOfInterest::Geometries(set) => normalize_geometries(set),
            AreaOfInterest::BoundingBox(bbox) => normalize_bbox(bbox),
        }
    }
}

fn normalize_countries(codes: &[String]) -> WorldPopResult<NormalizedAoi> {
    let mut seen = Vec::with_capacity(codes.len());
    for code in codes {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(WorldPopError::invalid_query("Empty country code"));
        }
        if !seen.contains(&code) {
            seen.push(code);
        }
    }
    if seen.is_empty() {
        return Err(WorldPopError::invalid_query(
            "At least one country code must be provided",
        ));
    }
    Ok(NormalizedAoi::Countries(seen))
}

fn normalize_geometries(set: &GeometrySet) -> WorldPopResult<NormalizedAoi> {
    if set.polygons.is_empty() {
        return Err(WorldPopError::invalid_query(
            "Geometry area of interest contains no polygons",
        ));
    }
    for polygon in &set.polygons {
        polygon.validate()?;
    }
    Ok(NormalizedAoi::Area(set.to_wgs84()?))
}

fn normalize_bbox(bbox: &BoundingBox) -> WorldPopResult<NormalizedAoi> {
    bbox.validate_geographic()?;
    Ok(NormalizedAoi::Area(GeometrySet::new(
        CrsCode::WGS84,
        vec![Polygon::from_bbox(bbox)],
    )))
}
