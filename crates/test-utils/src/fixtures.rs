//! Common test fixtures for WorldPop retrieval tests.
//!
//! The synthetic manifest mirrors the schema of the real WorldPop catalog
//! (`wpgpDatasets.csv`) with a handful of countries and products chosen to
//! cover annual, static, constrained and incomplete-coverage cases.

/// Header row of the WorldPop catalog CSV.
pub const MANIFEST_HEADER: &str = "ID,ISO,ISO3,Country,Covariate,PathToRaster,Description";

/// One row of a synthetic catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestRow {
    pub id: u64,
    pub numeric: &'static str,
    pub iso3: &'static str,
    pub country: &'static str,
    pub dataset: String,
    pub path: String,
    pub notes: &'static str,
}

impl ManifestRow {
    fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},\"{}\",{},{},\"{}\"",
            self.id, self.numeric, self.iso3, self.country, self.dataset, self.path, self.notes
        )
    }
}

/// Countries used by the synthetic manifest: (numeric, iso3, name).
pub const COUNTRIES: [(&str, &str, &str); 8] = [
    ("180", "COD", "Democratic Republic of the Congo"),
    ("140", "CAF", "Central African Republic"),
    ("728", "SSD", "South Sudan"),
    ("729", "SDN", "Sudan"),
    ("554", "NZL", "New Zealand"),
    ("840", "USA", "United States of America"),
    ("124", "CAN", "Canada"),
    ("484", "MEX", "Mexico"),
];

fn country(iso3: &str) -> (&'static str, &'static str, &'static str) {
    COUNTRIES
        .iter()
        .copied()
        .find(|(_, code, _)| *code == iso3)
        .unwrap_or(("000", "XXX", "Unknown"))
}

/// Rows of the synthetic manifest.
///
/// * `ppp` 2018-2020 for COD, CAF, SSD, SDN; 2019-2020 for NZL; 2020 only for USA
/// * `srtm_slope_100m` (static) for USA, CAN, MEX, COD
/// * `agesex_f_60_2020_constrained` (annual, year in the middle) for COD, CAF
/// * `dst_coastline_100m_2000_2020` (static, two year tokens) for COD
pub fn sample_manifest_rows() -> Vec<ManifestRow> {
    let mut rows = Vec::new();
    let mut push = |iso3: &str, dataset: String, path: String, notes: &'static str| {
        let (numeric, iso3, name) = country(iso3);
        rows.push(ManifestRow {
            id: rows.len() as u64 + 1,
            numeric,
            iso3,
            country: name,
            dataset,
            path,
            notes,
        });
    };

    let ppp_coverage: [(&str, &[i32]); 6] = [
        ("COD", &[2018, 2019, 2020]),
        ("CAF", &[2018, 2019, 2020]),
        ("SSD", &[2018, 2019, 2020]),
        ("SDN", &[2018, 2019, 2020]),
        ("NZL", &[2019, 2020]),
        ("USA", &[2020]),
    ];
    for (iso3, years) in ppp_coverage {
        for year in years {
            push(
                iso3,
                format!("ppp_{year}"),
                format!(
                    "GIS/Population/Global_2000_2020/{year}/{iso3}/{}_ppp_{year}.tif",
                    iso3.to_lowercase()
                ),
                "Estimated total number of people per grid-cell",
            );
        }
    }

    for iso3 in ["USA", "CAN", "MEX", "COD"] {
        push(
            iso3,
            "srtm_slope_100m".to_string(),
            format!(
                "GIS/Covariates/Global_2000_2020/{iso3}/Topo/{}_srtm_slope_100m.tif",
                iso3.to_lowercase()
            ),
            "Slope derived from SRTM at 3 arc seconds",
        );
    }

    for iso3 in ["COD", "CAF"] {
        push(
            iso3,
            "agesex_f_60_2020_constrained".to_string(),
            format!(
                "GIS/AgeSex_structures/Global_2000_2020_Constrained/2020/{iso3}/{}_f_60_2020_constrained.tif",
                iso3.to_lowercase()
            ),
            "Estimated number of females aged 60 to 64, constrained",
        );
    }

    push(
        "COD",
        "dst_coastline_100m_2000_2020".to_string(),
        "GIS/Covariates/Global_2000_2020/COD/Coastline/cod_dst_coastline_100m_2000_2020.tif"
            .to_string(),
        "Distance to coastline 2000-2020",
    );

    rows
}

/// Render rows as catalog CSV text, header included.
pub fn manifest_csv(rows: &[ManifestRow]) -> String {
    let mut out = String::from(MANIFEST_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&row.to_csv_line());
        out.push('\n');
    }
    out
}

/// The synthetic manifest as CSV text.
pub fn sample_manifest_csv() -> String {
    manifest_csv(&sample_manifest_rows())
}

/// Hex MD5 digest, as published in `wpgpDatasets.md5`.
pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Content of a published hash file for `csv`.
pub fn hash_file_for(csv: &str) -> String {
    format!("{}  wpgpDatasets.csv\n", md5_hex(csv.as_bytes()))
}

/// Approximate country extents as (min_lon, min_lat, max_lon, max_lat).
pub mod country_bounds {
    pub const COD: (f64, f64, f64, f64) = (12.2, -13.5, 31.3, 5.4);
    pub const CAF: (f64, f64, f64, f64) = (14.4, 2.2, 27.5, 11.0);
    pub const SSD: (f64, f64, f64, f64) = (23.4, 3.5, 35.9, 12.2);
    pub const SDN: (f64, f64, f64, f64) = (21.8, 8.7, 38.6, 22.2);
    pub const NZL: (f64, f64, f64, f64) = (166.4, -47.3, 178.6, -34.4);
    pub const USA: (f64, f64, f64, f64) = (-125.0, 24.5, -66.9, 49.4);
    pub const CAN: (f64, f64, f64, f64) = (-141.0, 41.7, -52.6, 83.1);
    pub const MEX: (f64, f64, f64, f64) = (-118.4, 14.5, -86.7, 32.7);

    /// All extents keyed by ISO3 code.
    pub const ALL: [(&str, (f64, f64, f64, f64)); 8] = [
        ("COD", COD),
        ("CAF", CAF),
        ("SSD", SSD),
        ("SDN", SDN),
        ("NZL", NZL),
        ("USA", USA),
        ("CAN", CAN),
        ("MEX", MEX),
    ];
}

/// Common bounding box definitions for testing.
pub mod bbox {
    /// Border region between CAF, SSD and COD
    pub const CENTRAL_AFRICA: (f64, f64, f64, f64) = (24.0, 4.0, 26.0, 6.0);

    /// Open Pacific, no country
    pub const OPEN_OCEAN: (f64, f64, f64, f64) = (-150.0, -10.0, -140.0, 0.0);

    /// Invalid bbox (min > max)
    pub const INVALID: (f64, f64, f64, f64) = (10.0, 10.0, 5.0, 5.0);
}
