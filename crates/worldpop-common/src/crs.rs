//! Coordinate Reference System codes and reprojection to geographic WGS84.
//!
//! Any EPSG code known to the `crs-definitions` database is accepted; points
//! are reprojected with `proj4rs`.

use std::fmt;

use proj4rs::proj::Proj;
use serde::{Deserialize, Serialize};

/// An EPSG coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CrsCode(u16);

impl CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    pub const WGS84: CrsCode = CrsCode(4326);
    /// NAD83 Geographic
    pub const NAD83: CrsCode = CrsCode(4269);
    /// Web Mercator (meters)
    pub const WEB_MERCATOR: CrsCode = CrsCode(3857);

    /// Parse strings like "EPSG:4326", "epsg:32633" or "CRS:84".
    pub fn parse(s: &str) -> Result<Self, CrsError> {
        let normalized = s.trim().to_uppercase();
        let unsupported = || CrsError::UnsupportedCrs(s.to_string());

        match normalized.as_str() {
            "CRS:84" | "WGS84" => Ok(CrsCode::WGS84),
            other => {
                let code = other
                    .strip_prefix("EPSG:")
                    .and_then(|code| code.trim().parse::<u32>().ok())
                    .ok_or_else(unsupported)?;
                CrsCode::from_epsg(code).ok_or_else(unsupported)
            }
        }
    }

    /// Look up a CRS from its numeric EPSG code.
    pub fn from_epsg(code: u32) -> Option<Self> {
        if code == 900913 {
            return Some(CrsCode::WEB_MERCATOR);
        }
        let code = u16::try_from(code).ok()?;
        crs_definitions::from_code(code).map(|_| CrsCode(code))
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        u32::from(self.0)
    }

    /// PROJ.4 definition of this CRS.
    pub fn proj_string(&self) -> Result<&'static str, CrsError> {
        crs_definitions::from_code(self.0)
            .map(|def| def.proj4)
            .ok_or_else(|| CrsError::UnsupportedCrs(self.to_string()))
    }

    /// Check if this is a geographic (lon/lat) CRS.
    pub fn is_geographic(&self) -> bool {
        self.proj_string()
            .is_ok_and(|proj| proj.contains("+proj=longlat"))
    }

    /// Build a reusable transform from this CRS to WGS84.
    pub fn wgs84_transform(&self) -> Result<Wgs84Transform, CrsError> {
        if *self == CrsCode::WGS84 {
            return Ok(Wgs84Transform {
                crs: *self,
                projs: None,
            });
        }
        let source = Proj::from_proj_string(self.proj_string()?)
            .map_err(|e| CrsError::projection(*self, format!("invalid definition: {e:?}")))?;
        let target = Proj::from_proj_string(CrsCode::WGS84.proj_string()?)
            .map_err(|e| CrsError::projection(CrsCode::WGS84, format!("invalid definition: {e:?}")))?;
        Ok(Wgs84Transform {
            crs: *self,
            projs: Some((source, target, self.is_geographic())),
        })
    }

    /// Convert a single coordinate in this CRS to WGS84 `(lon, lat)`.
    pub fn to_wgs84(&self, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        self.wgs84_transform()?.transform(x, y)
    }
}

/// Projections from one CRS to WGS84, parsed once and applied per point.
pub struct Wgs84Transform {
    crs: CrsCode,
    /// `None` when the source already is WGS84.
    projs: Option<(Proj, Proj, bool)>,
}

impl Wgs84Transform {
    pub fn source(&self) -> CrsCode {
        self.crs
    }

    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        let Some((source, target, source_geographic)) = &self.projs else {
            return Ok((x, y));
        };
        // proj4rs works in radians for geographic systems
        let mut point = if *source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        proj4rs::transform::transform(source, target, &mut point)
            .map_err(|e| CrsError::projection(self.crs, format!("({x}, {y}): {e:?}")))?;
        let (lon, lat) = (point.0.to_degrees(), point.1.to_degrees());
        if !lon.is_finite() || !lat.is_finite() {
            return Err(CrsError::projection(self.crs, format!("({x}, {y}) has no WGS84 position")));
        }
        Ok((lon, lat))
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl TryFrom<String> for CrsCode {
    type Error = CrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CrsCode::parse(&value)
    }
}

impl From<CrsCode> for String {
    fn from(crs: CrsCode) -> Self {
        crs.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsError {
    #[error("Unsupported CRS: {0}. Expected an EPSG code such as EPSG:4326 or EPSG:32633")]
    UnsupportedCrs(String),

    #[error("Cannot reproject from {crs} to EPSG:4326: {message}")]
    Projection { crs: CrsCode, message: String },
}

impl CrsError {
    fn projection(crs: CrsCode, message: impl Into<String>) -> Self {
        CrsError::Projection {
            crs,
            message: message.into(),
        }
    }
}

impl From<CrsError> for crate::WorldPopError {
    fn from(err: CrsError) -> Self {
        crate::WorldPopError::InvalidQuery(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: (f64, f64), expected: (f64, f64), tol: f64) {
        assert!(
            (actual.0 - expected.0).abs() < tol && (actual.1 - expected.1).abs() < tol,
            "{actual:?} is not within {tol} of {expected:?}"
        );
    }

    #[test]
    fn test_parse_crs() {
        assert_eq!(CrsCode::parse("EPSG:4326").unwrap(), CrsCode::WGS84);
        assert_eq!(CrsCode::parse("epsg:3857").unwrap(), CrsCode::WEB_MERCATOR);
        assert_eq!(CrsCode::parse("EPSG:900913").unwrap(), CrsCode::WEB_MERCATOR);
        assert_eq!(CrsCode::parse("CRS:84").unwrap(), CrsCode::WGS84);
        assert_eq!(CrsCode::parse(" EPSG:32633 ").unwrap().epsg(), 32633);
        assert!(CrsCode::parse("EPSG:99999").is_err());
        assert!(CrsCode::parse("EPSG:abc").is_err());
        assert!(CrsCode::parse("4326").is_err());
        assert_eq!(CrsCode::from_epsg(4269), Some(CrsCode::NAD83));
        assert_eq!(CrsCode::from_epsg(3035).map(|c| c.epsg()), Some(3035));
        assert_eq!(CrsCode::from_epsg(70_000), None);
        assert_eq!(CrsCode::WEB_MERCATOR.to_string(), "EPSG:3857");
    }

    #[test]
    fn test_serde_uses_epsg_string() {
        let json = serde_json::to_string(&CrsCode::WGS84).unwrap();
        assert_eq!(json, r#""EPSG:4326""#);
        let utm: CrsCode = serde_json::from_str(r#""EPSG:32633""#).unwrap();
        assert_eq!(utm.epsg(), 32633);
        assert!(serde_json::from_str::<CrsCode>(r#""EPSG:99999""#).is_err());
    }

    #[test]
    fn test_web_mercator_to_wgs84() {
        let mercator = CrsCode::WEB_MERCATOR.wgs84_transform().unwrap();
        assert_close(mercator.transform(0.0, 0.0).unwrap(), (0.0, 0.0), 1e-9);

        // 20037508.34 m is the antimeridian
        let (lon, _) = mercator.transform(20_037_508.342789244, 0.0).unwrap();
        assert!((lon - 180.0).abs() < 1e-6);

        // 45 degrees north
        let (_, lat) = mercator.transform(0.0, 5_621_521.486192066).unwrap();
        assert!((lat - 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_utm_to_wgs84() {
        // UTM 33N false easting sits on the 15E central meridian.
        let utm = CrsCode::parse("EPSG:32633").unwrap();
        assert!(!utm.is_geographic());
        assert_close(utm.to_wgs84(500_000.0, 0.0).unwrap(), (15.0, 0.0), 1e-6);

        let (lon, lat) = utm.to_wgs84(500_000.0, 5_538_630.7).unwrap();
        assert!((lon - 15.0).abs() < 1e-6);
        assert!((lat - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_laea_europe_to_wgs84() {
        // ETRS89-LAEA is centred on 10E 52N with 4321000 / 3210000 false origin.
        let laea = CrsCode::from_epsg(3035).unwrap();
        assert_close(laea.to_wgs84(4_321_000.0, 3_210_000.0).unwrap(), (10.0, 52.0), 1e-6);
    }

    #[test]
    fn test_geographic_is_identity() {
        assert_eq!(CrsCode::WGS84.to_wgs84(12.5, -3.25).unwrap(), (12.5, -3.25));
        assert_close(CrsCode::NAD83.to_wgs84(-100.0, 30.0).unwrap(), (-100.0, 30.0), 1e-9);
        assert!(CrsCode::NAD83.is_geographic());
        assert!(!CrsCode::WEB_MERCATOR.is_geographic());
    }
}
