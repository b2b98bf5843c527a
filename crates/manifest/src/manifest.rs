//! The validated, in-memory catalog and its name indexes.

use std::collections::{BTreeSet, HashSet};

use worldpop_common::{WorldPopError, WorldPopResult, RASTER_EXTENSION};

use crate::entry::ManifestEntry;

/// The validated catalog of all known datasets.
///
/// Construction enforces the catalog invariants: one row per
/// (dataset, country) pair and a single raster format. Name indexes are
/// computed once and returned sorted.
#[derive(Debug, Clone)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    iso_codes: Vec<String>,
    static_products: Vec<String>,
    annual_products: Vec<String>,
    annual_years: Vec<i32>,
    dataset_names: Vec<String>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> WorldPopResult<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert((entry.dataset_name.as_str(), entry.iso3.as_str())) {
                return Err(WorldPopError::integrity(format!(
                    "duplicated dataset '{}' for country {}; there should be no duplicated \
                     WorldPop datasets at the country level",
                    entry.dataset_name, entry.iso3
                )));
            }
        }

        let formats: BTreeSet<&str> = entries.iter().map(ManifestEntry::raster_format).collect();
        if formats.iter().any(|f| *f != RASTER_EXTENSION) {
            return Err(WorldPopError::integrity(format!(
                "unexpected file formats in manifest ({}); all raster datasets should be .{} files",
                formats.into_iter().collect::<Vec<_>>().join(", "),
                RASTER_EXTENSION
            )));
        }

        let iso_codes = sorted_unique(entries.iter().map(|e| e.iso3.as_str()));
        let static_products = sorted_unique(
            entries
                .iter()
                .filter(|e| !e.is_annual)
                .map(|e| e.product_name.as_str()),
        );
        let annual_products = sorted_unique(
            entries
                .iter()
                .filter(|e| e.is_annual)
                .map(|e| e.product_name.as_str()),
        );
        let dataset_names = sorted_unique(entries.iter().map(|e| e.dataset_name.as_str()));
        let annual_years: Vec<i32> = entries
            .iter()
            .filter_map(|e| e.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(Self {
            entries,
            iso_codes,
            static_products,
            annual_products,
            annual_years,
            dataset_names,
        })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// ISO3 codes of all countries with at least one dataset.
    pub fn iso_codes(&self) -> &[String] {
        &self.iso_codes
    }

    pub fn static_product_names(&self) -> &[String] {
        &self.static_products
    }

    /// Annual products with at least one year available.
    pub fn annual_product_names(&self) -> &[String] {
        &self.annual_products
    }

    /// Years for which at least one annual product exists.
    pub fn annual_years(&self) -> &[i32] {
        &self.annual_years
    }

    /// All dataset names; each year of an annual product counts separately.
    pub fn dataset_names(&self) -> &[String] {
        &self.dataset_names
    }

    pub fn has_country(&self, iso3: &str) -> bool {
        self.iso_codes.binary_search_by(|c| c.as_str().cmp(iso3)).is_ok()
    }

    pub fn is_static_product(&self, product: &str) -> bool {
        self.static_products
            .binary_search_by(|p| p.as_str().cmp(product))
            .is_ok()
    }

    pub fn is_annual_product(&self, product: &str) -> bool {
        self.annual_products
            .binary_search_by(|p| p.as_str().cmp(product))
            .is_ok()
    }

    /// Countries covered by `product`, sorted.
    pub fn countries_for_product(&self, product: &str) -> Vec<String> {
        sorted_unique(
            self.entries
                .iter()
                .filter(|e| e.product_name == product)
                .map(|e| e.iso3.as_str()),
        )
    }

    /// Years available for an annual `product`, sorted.
    pub fn years_for_product(&self, product: &str) -> Vec<i32> {
        self.entries
            .iter()
            .filter(|e| e.product_name == product)
            .filter_map(|e| e.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn sorted_unique<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    names
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::parse_catalog;

    fn sample() -> Manifest {
        let csv = test_utils::sample_manifest_csv();
        Manifest::new(parse_catalog(csv.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_name_indexes() {
        let manifest = sample();
        assert_eq!(
            manifest.iso_codes(),
            ["CAF", "CAN", "COD", "MEX", "NZL", "SDN", "SSD", "USA"]
        );
        assert_eq!(
            manifest.static_product_names(),
            ["dst_coastline_100m_2000_2020", "srtm_slope_100m"]
        );
        assert_eq!(
            manifest.annual_product_names(),
            ["agesex_f_60_constrained", "ppp"]
        );
        assert_eq!(manifest.annual_years(), [2018, 2019, 2020]);
        assert!(manifest.dataset_names().contains(&"ppp_2019".to_string()));
        assert!(manifest.has_country("NZL"));
        assert!(!manifest.has_country("XXX"));
    }

    #[test]
    fn test_duplicates_rejected() {
        let csv = test_utils::sample_manifest_csv();
        let mut entries = parse_catalog(csv.as_bytes()).unwrap();
        entries.push(entries[0].clone());
        let err = Manifest::new(entries).unwrap_err();
        assert!(matches!(err, WorldPopError::Integrity(_)));
        assert!(err.to_string().contains("duplicated"));
    }

    #[test]
    fn test_mixed_formats_rejected() {
        let csv = test_utils::sample_manifest_csv();
        let mut entries = parse_catalog(csv.as_bytes()).unwrap();
        entries[3].remote_path = entries[3].remote_path.replace(".tif", ".nc");
        let err = Manifest::new(entries).unwrap_err();
        assert!(err.to_string().contains("unexpected file formats"));
    }

    #[test]
    fn test_product_coverage_helpers() {
        let manifest = sample();
        assert_eq!(manifest.years_for_product("ppp"), vec![2018, 2019, 2020]);
        assert_eq!(
            manifest.countries_for_product("srtm_slope_100m"),
            vec!["CAN", "COD", "MEX", "USA"]
        );
    }
}
