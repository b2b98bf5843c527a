//! Year-token rules for WorldPop dataset and file names.
//!
//! Annual datasets carry exactly one `_YYYY` token in their name, e.g.
//! `ppp_2020` or `agesex_f_60_2020_constrained`. The same rule classifies
//! manifest rows, derives product names, and groups downloaded files by year.

use std::sync::LazyLock;

use chrono::{Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Earliest plausible year for an annual WorldPop dataset.
pub const FIRST_YEAR: i32 = 2000;

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\d{4}").expect("year pattern is a valid regex"));

/// Whether a product is a single snapshot or one snapshot per year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Static,
    Annual,
}

impl std::fmt::Display for ProductKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductKind::Static => write!(f, "static"),
            ProductKind::Annual => write!(f, "annual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Bad format ('{name}'). Name of an annual dataset must contain exactly one valid year \
     identifier between {} and {last_year}.",
    FIRST_YEAR
)]
pub struct YearError {
    pub name: String,
    pub last_year: i32,
}

/// Extract the year identifier from the name of an annual dataset (or one of its files).
///
/// Fails when the name holds no `_YYYY` token, more than one, or a year outside
/// `FIRST_YEAR..=current year`.
pub fn extract_year(name: &str) -> Result<i32, YearError> {
    extract_year_until(name, Utc::now().year())
}

/// Same as [`extract_year`] with an explicit upper bound on plausible years.
pub fn extract_year_until(name: &str, last_year: i32) -> Result<i32, YearError> {
    let bad_format = || YearError {
        name: name.to_string(),
        last_year,
    };

    let mut matches = YEAR_PATTERN.find_iter(name);
    let token = matches.next().ok_or_else(bad_format)?;
    if matches.next().is_some() {
        return Err(bad_format());
    }

    let year: i32 = token.as_str()[1..].parse().map_err(|_| bad_format())?;
    if !(FIRST_YEAR..=last_year).contains(&year) {
        return Err(bad_format());
    }

    Ok(year)
}

/// Whether `name` is consistent with an annual dataset.
pub fn looks_like_annual_name(name: &str) -> bool {
    extract_year(name).is_ok()
}

/// Remove the single year token from an annual dataset name.
///
/// `strip_year("ppp_2020")` is `"ppp"`; `strip_year("foo_2020_constrained")`
/// is `"foo_constrained"`.
pub fn strip_year(name: &str) -> Result<String, YearError> {
    let year = extract_year(name)?;
    Ok(name.replacen(&format!("_{year}"), "", 1))
}

/// Classify a dataset name.
pub fn product_kind(name: &str) -> ProductKind {
    if looks_like_annual_name(name) {
        ProductKind::Annual
    } else {
        ProductKind::Static
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_good_year_extraction() {
        assert_eq!(extract_year("some_dataset_2020").unwrap(), 2020);
        assert_eq!(extract_year("ppp_COD_2018.tif").unwrap(), 2018);
        assert_eq!(extract_year("agesex_f_60_2020_constrained").unwrap(), 2020);
    }

    #[test]
    fn test_bad_year_extraction() {
        assert!(extract_year("bad_name").is_err());
        assert!(extract_year("bad_name_1889").is_err());
        assert!(extract_year("foo_2020_to_2020").is_err());
        assert!(extract_year("dst_coastline_100m_2000_2020").is_err());
    }

    #[test]
    fn test_year_ceiling() {
        assert!(extract_year_until("ppp_2030", 2029).is_err());
        assert_eq!(extract_year_until("ppp_2029", 2029).unwrap(), 2029);
        assert!(extract_year(&format!("ppp_{}", Utc::now().year() + 1)).is_err());
    }

    #[test]
    fn test_year_stripping() {
        assert_eq!(strip_year("some_dataset_2020").unwrap(), "some_dataset");
        assert_eq!(
            strip_year("some_dataset_2020_constrained").unwrap(),
            "some_dataset_constrained"
        );
        assert!(strip_year("static_name").is_err());
    }

    #[test]
    fn test_strip_then_append_reconstructs_trailing_names() {
        for name in ["ppp_2000", "ppp_2019", "agesex_m_0_2010"] {
            let year = extract_year(name).unwrap();
            let product = strip_year(name).unwrap();
            assert_eq!(format!("{product}_{year}"), name);
        }
    }

    #[test]
    fn test_looks_like_annual_name() {
        assert!(looks_like_annual_name("foo_2020"));
        assert!(!looks_like_annual_name("foo_2020_to_2020"));
        assert!(!looks_like_annual_name("foo"));
        assert_eq!(product_kind("ppp_2015"), ProductKind::Annual);
        assert_eq!(product_kind("srtm_slope_100m"), ProductKind::Static);
    }
}
