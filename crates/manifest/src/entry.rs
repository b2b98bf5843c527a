//! Catalog records and their derived columns.

use serde::{Deserialize, Serialize};
use tracing::debug;

use worldpop_common::year::{extract_year, strip_year};
use worldpop_common::{WorldPopError, WorldPopResult};

/// Column names of the upstream catalog CSV, in order.
pub const CATALOG_COLUMNS: [&str; 7] = [
    "ID",
    "ISO",
    "ISO3",
    "Country",
    "Covariate",
    "PathToRaster",
    "Description",
];

/// One row exactly as it appears in the upstream catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(rename = "ISO")]
    pub country_numeric: String,
    #[serde(rename = "ISO3")]
    pub iso3: String,
    #[serde(rename = "Country")]
    pub country_name: String,
    #[serde(rename = "Covariate")]
    pub dataset_name: String,
    #[serde(rename = "PathToRaster")]
    pub remote_path: String,
    #[serde(rename = "Description", default)]
    pub notes: String,
}

/// A single country's instance of a single dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Numerical WorldPop dataset ID.
    pub idx: u64,
    /// ISO 3166-1 numeric-3 code.
    pub country_numeric: String,
    /// ISO 3166-1 alpha-3 code.
    pub iso3: String,
    pub country_name: String,
    /// Dataset name, including the year token for annual datasets.
    pub dataset_name: String,
    /// Path relative to the WorldPop data host.
    pub remote_path: String,
    pub notes: String,
    pub is_annual: bool,
    /// Dataset name with the year token removed; the name users query by.
    pub product_name: String,
    pub year: Option<i32>,
    /// Last segment of `remote_path`.
    pub remote_fname: String,
}

impl ManifestEntry {
    /// Derive the computed columns from a raw catalog row.
    pub fn from_record(raw: RawRecord) -> Self {
        let (is_annual, product_name, year) = match extract_year(&raw.dataset_name) {
            Ok(year) => {
                let product = strip_year(&raw.dataset_name).unwrap_or_else(|_| raw.dataset_name.clone());
                (true, product, Some(year))
            }
            Err(_) => (false, raw.dataset_name.clone(), None),
        };

        let remote_fname = raw
            .remote_path
            .rsplit('/')
            .next()
            .unwrap_or(&raw.remote_path)
            .to_string();

        Self {
            idx: raw.id,
            country_numeric: raw.country_numeric,
            iso3: raw.iso3.trim().to_uppercase(),
            country_name: raw.country_name,
            dataset_name: raw.dataset_name,
            remote_path: raw.remote_path,
            notes: raw.notes,
            is_annual,
            product_name,
            year,
            remote_fname,
        }
    }

    /// File format implied by the remote path's extension.
    pub fn raster_format(&self) -> &str {
        self.remote_path.rsplit('.').next().unwrap_or("")
    }
}

/// Parse the raw catalog CSV into manifest entries.
///
/// The header must match [`CATALOG_COLUMNS`]; any schema drift or malformed
/// row is an integrity failure.
pub fn parse_catalog(body: &[u8]) -> WorldPopResult<Vec<ManifestEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|e| WorldPopError::integrity(format!("unreadable catalog header ({e})")))?;
    let found: Vec<&str> = headers.iter().collect();
    if found != CATALOG_COLUMNS {
        return Err(WorldPopError::integrity(format!(
            "unexpected catalog columns [{}], expected [{}]",
            found.join(", "),
            CATALOG_COLUMNS.join(", ")
        )));
    }

    let mut entries = Vec::new();
    for (line, record) in reader.deserialize::<RawRecord>().enumerate() {
        let raw = record.map_err(|e| {
            WorldPopError::integrity(format!("malformed catalog row {} ({e})", line + 2))
        })?;
        entries.push(ManifestEntry::from_record(raw));
    }

    debug!(rows = entries.len(), "Parsed catalog");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(dataset: &str, path: &str) -> RawRecord {
        RawRecord {
            id: 1,
            country_numeric: "554".to_string(),
            iso3: "nzl".to_string(),
            country_name: "New Zealand".to_string(),
            dataset_name: dataset.to_string(),
            remote_path: path.to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_annual_entry_columns() {
        let entry = ManifestEntry::from_record(raw(
            "ppp_2020",
            "GIS/Population/Global_2000_2020/2020/NZL/nzl_ppp_2020.tif",
        ));
        assert!(entry.is_annual);
        assert_eq!(entry.product_name, "ppp");
        assert_eq!(entry.year, Some(2020));
        assert_eq!(entry.iso3, "NZL");
        assert_eq!(entry.remote_fname, "nzl_ppp_2020.tif");
        assert_eq!(entry.raster_format(), "tif");
    }

    #[test]
    fn test_static_entry_columns() {
        let entry = ManifestEntry::from_record(raw(
            "dst_coastline_100m_2000_2020",
            "GIS/Covariates/nzl_dst_coastline_100m_2000_2020.tif",
        ));
        assert!(!entry.is_annual);
        assert_eq!(entry.product_name, "dst_coastline_100m_2000_2020");
        assert_eq!(entry.year, None);
    }

    #[test]
    fn test_parse_rejects_schema_drift() {
        let body = b"ID,ISO,ISO3,Country,Dataset,PathToRaster,Description\n";
        let err = parse_catalog(body).unwrap_err();
        assert!(matches!(err, WorldPopError::Integrity(_)));
    }

    #[test]
    fn test_parse_rejects_bad_row() {
        let body = b"ID,ISO,ISO3,Country,Covariate,PathToRaster,Description\nnot-a-number,554,NZL,New Zealand,ppp_2020,a.tif,x\n";
        let err = parse_catalog(body).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_parse_tolerates_padded_header() {
        let body = b"ID, ISO, ISO3, Country, Covariate, PathToRaster, Description\n1,554,NZL,\"New Zealand\",ppp_2020,a/b.tif,\"people, per cell\"\n";
        let entries = parse_catalog(body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].notes, "people, per cell");
    }
}
