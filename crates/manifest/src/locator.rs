//! Spatial country selection for geometry and bounding-box requests.

use std::collections::BTreeMap;

use worldpop_common::{BoundingBox, GeometrySet, WorldPopResult};

/// Finds the countries whose coverage intersects an area.
///
/// Implementations receive geometries already normalized to WGS84.
pub trait CountryLocator: Send + Sync {
    /// ISO3 codes of intersecting countries, in any order.
    fn countries_intersecting(&self, area: &GeometrySet) -> WorldPopResult<Vec<String>>;
}

/// Locator backed by a table of country extents.
///
/// A country is selected when its extent overlaps the extent of any polygon,
/// which may over-select near borders but never misses a country.
#[derive(Debug, Clone, Default)]
pub struct BoundsCountryLocator {
    extents: BTreeMap<String, BoundingBox>,
}

impl BoundsCountryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(iso3, (min_lon, min_lat, max_lon, max_lat))` pairs.
    pub fn from_extents<'a>(
        extents: impl IntoIterator<Item = (&'a str, (f64, f64, f64, f64))>,
    ) -> Self {
        let mut locator = Self::new();
        for (iso3, (min_x, min_y, max_x, max_y)) in extents {
            locator.insert(iso3, BoundingBox::new(min_x, min_y, max_x, max_y));
        }
        locator
    }

    pub fn insert(&mut self, iso3: &str, extent: BoundingBox) {
        self.extents.insert(iso3.to_uppercase(), extent);
    }

    pub fn len(&self) -> usize {
        self.extents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }
}

impl CountryLocator for BoundsCountryLocator {
    fn countries_intersecting(&self, area: &GeometrySet) -> WorldPopResult<Vec<String>> {
        let polygon_bounds: Vec<BoundingBox> =
            area.polygons.iter().filter_map(|p| p.bounds()).collect();

        Ok(self
            .extents
            .iter()
            .filter(|(_, extent)| polygon_bounds.iter().any(|b| b.intersects(extent)))
            .map(|(iso3, _)| iso3.clone())
            .collect())
    }
}
