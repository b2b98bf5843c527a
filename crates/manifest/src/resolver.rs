//! Turns a (product, area, years) request into concrete files to fetch.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use worldpop_common::year::{extract_year, ProductKind};
use worldpop_common::{
    cache_file_name, AreaOfInterest, FileDescriptor, GeometrySet, NormalizedAoi, WorldPopError,
    WorldPopResult,
};

use crate::locator::CountryLocator;
use crate::manifest::Manifest;

/// One manifest entry selected by a query, with its cache location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFile {
    pub product_name: String,
    pub dataset_name: String,
    pub iso3: String,
    pub year: Option<i32>,
    pub descriptor: FileDescriptor,
}

/// Files required by a query, ordered by country then year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFileSet {
    files: Vec<ResolvedFile>,
}

impl ResolvedFileSet {
    pub fn new(mut files: Vec<ResolvedFile>) -> Self {
        files.sort_by(|a, b| (&a.iso3, a.year).cmp(&(&b.iso3, b.year)));
        files.dedup_by(|a, b| a.descriptor == b.descriptor);
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedFile> {
        self.files.iter()
    }

    pub fn files(&self) -> &[ResolvedFile] {
        &self.files
    }

    /// (remote path, local path) pairs for the download engine.
    pub fn descriptors(&self) -> Vec<FileDescriptor> {
        self.files.iter().map(|f| f.descriptor.clone()).collect()
    }

    pub fn local_paths(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .map(|f| f.descriptor.local_path.clone())
            .collect()
    }
}

/// Outcome of resolving one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub product_name: String,
    pub kind: ProductKind,
    /// Normalized countries, in request order.
    pub countries: Vec<String>,
    /// Sorted, de-duplicated years for annual products.
    pub years: Option<Vec<i32>>,
    pub files: ResolvedFileSet,
    /// WGS84 geometry to clip merged rasters to, for area requests.
    pub clip: Option<GeometrySet>,
}

/// Validates requests against a manifest and selects the matching entries.
pub struct QueryResolver {
    manifest: Arc<Manifest>,
    cache_dir: PathBuf,
    locator: Option<Arc<dyn CountryLocator>>,
}

impl QueryResolver {
    pub fn new(manifest: Arc<Manifest>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            cache_dir: cache_dir.into(),
            locator: None,
        }
    }

    /// Enable geometry and bounding-box areas of interest.
    pub fn with_locator(mut self, locator: Arc<dyn CountryLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Resolve a request. `years` selects an annual product; `None` a static one.
    ///
    /// Validation fails fast in this order: year token in the product name,
    /// area of interest, country codes, product category, coverage.
    #[instrument(skip(self, area, years), fields(product = %product))]
    pub fn resolve(
        &self,
        product: &str,
        area: &AreaOfInterest,
        years: Option<&[i32]>,
    ) -> WorldPopResult<Resolution> {
        if extract_year(product).is_ok() {
            return Err(WorldPopError::invalid_query(
                "'product_name' should never contain a year identifier. For annual data \
                 products, use the separate 'years' argument to specify the year (or years) \
                 of interest.",
            ));
        }

        let years = normalize_years(years)?;
        let (countries, clip) = self.select_countries(area)?;
        self.check_countries_exist(&countries)?;

        let kind = if years.is_some() {
            ProductKind::Annual
        } else {
            ProductKind::Static
        };
        self.check_product_exists(product, kind)?;

        let files = self.filter_entries(product, &countries, years.as_deref())?;
        info!(
            countries = countries.len(),
            years = ?years,
            files = files.len(),
            "Resolved query"
        );

        Ok(Resolution {
            product_name: product.to_string(),
            kind,
            countries,
            years,
            files,
            clip,
        })
    }

    fn select_countries(
        &self,
        area: &AreaOfInterest,
    ) -> WorldPopResult<(Vec<String>, Option<GeometrySet>)> {
        match area.normalize()? {
            NormalizedAoi::Countries(codes) => Ok((codes, None)),
            NormalizedAoi::Area(geometry) => {
                let locator = self.locator.as_ref().ok_or_else(|| {
                    WorldPopError::invalid_query(
                        "geometry and bounding-box areas need a country locator; \
                         pass country codes instead",
                    )
                })?;
                let mut codes = locator.countries_intersecting(&geometry)?;
                codes.sort();
                codes.dedup();
                // Countries without any WorldPop data cannot contribute to the area.
                codes.retain(|c| self.manifest.has_country(c));
                debug!(countries = ?codes, "Selected countries for area");
                if codes.is_empty() {
                    return Err(WorldPopError::NoDataInBounds(
                        "no WorldPop country intersects the requested area".to_string(),
                    ));
                }
                Ok((codes, Some(geometry)))
            }
        }
    }

    fn check_countries_exist(&self, countries: &[String]) -> WorldPopResult<()> {
        let mut unknown: Vec<String> = countries
            .iter()
            .filter(|c| !self.manifest.has_country(c))
            .cloned()
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort();
        Err(WorldPopError::UnknownCountry { codes: unknown })
    }

    fn check_product_exists(&self, product: &str, kind: ProductKind) -> WorldPopResult<()> {
        let exists = match kind {
            ProductKind::Static => self.manifest.is_static_product(product),
            ProductKind::Annual => self.manifest.is_annual_product(product),
        };
        if exists {
            Ok(())
        } else {
            Err(WorldPopError::UnknownProduct {
                product: product.to_string(),
                expected: kind,
            })
        }
    }

    fn filter_entries(
        &self,
        product: &str,
        countries: &[String],
        years: Option<&[i32]>,
    ) -> WorldPopResult<ResolvedFileSet> {
        let wanted: HashSet<&str> = countries.iter().map(String::as_str).collect();
        let matched: Vec<ResolvedFile> = self
            .manifest
            .entries()
            .iter()
            .filter(|e| e.product_name == product && wanted.contains(e.iso3.as_str()))
            .filter(|e| match years {
                Some(years) => e.year.is_some_and(|y| years.contains(&y)),
                None => true,
            })
            .map(|e| {
                let local = self
                    .cache_dir
                    .join(cache_file_name(&e.product_name, &e.iso3, e.year));
                ResolvedFile {
                    product_name: e.product_name.clone(),
                    dataset_name: e.dataset_name.clone(),
                    iso3: e.iso3.clone(),
                    year: e.year,
                    descriptor: FileDescriptor::new(e.remote_path.clone(), local),
                }
            })
            .collect();

        let expected = countries.len() * years.map_or(1, <[i32]>::len);
        if matched.len() < expected {
            let found: HashSet<(&str, Option<i32>)> =
                matched.iter().map(|f| (f.iso3.as_str(), f.year)).collect();
            let combos: Vec<(String, Option<i32>)> = match years {
                Some(years) => countries
                    .iter()
                    .flat_map(|c| years.iter().map(move |y| (c.clone(), Some(*y))))
                    .collect(),
                None => countries.iter().map(|c| (c.clone(), None)).collect(),
            };
            let missing = combos
                .into_iter()
                .filter(|(c, y)| !found.contains(&(c.as_str(), *y)))
                .collect();
            return Err(WorldPopError::IncompleteCoverage {
                product: product.to_string(),
                missing,
            });
        }
        debug_assert_eq!(
            matched.len(),
            expected,
            "manifest holds duplicated entries for product '{product}'"
        );

        Ok(ResolvedFileSet::new(matched))
    }
}

fn normalize_years(years: Option<&[i32]>) -> WorldPopResult<Option<Vec<i32>>> {
    let Some(years) = years else {
        return Ok(None);
    };
    let mut years = years.to_vec();
    years.sort_unstable();
    years.dedup();
    if years.is_empty() {
        return Err(WorldPopError::invalid_query(
            "At least one year must be provided for annual data products",
        ));
    }
    Ok(Some(years))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_years() {
        assert_eq!(normalize_years(None).unwrap(), None);
        assert_eq!(
            normalize_years(Some(&[2020, 2018, 2020])).unwrap(),
            Some(vec![2018, 2020])
        );
        assert!(normalize_years(Some(&[])).is_err());
    }
}
