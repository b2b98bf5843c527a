//! Command-line arguments.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use worldpop::{
    AreaOfInterest, BoundingBox, BoundsCountryLocator, GeometrySet, MergeMethod, MergeOptions,
    RasterRequest, ReadOptions,
};

#[derive(Parser, Debug)]
#[command(name = "worldpop")]
#[command(about = "Fetch, cache and merge WorldPop rasters")]
pub struct Cli {
    /// Root directory for cached rasters and the manifest
    #[arg(long, env = "WORLDPOP_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Maximum concurrent downloads
    #[arg(long, env = "WORLDPOP_MAX_CONCURRENCY", global = true)]
    pub max_concurrency: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download the files of a request into the cache
    Fetch(RequestArgs),

    /// Download and merge a request, writing GeoTIFF output
    Raster {
        #[command(flatten)]
        request: RequestArgs,

        /// Output file; annual products write one file per year next to it
        #[arg(short, long)]
        output: PathBuf,

        /// How overlapping pixels combine: first, last, min, max or sum
        #[arg(long, default_value = "first")]
        method: String,

        /// Target pixel size as "x,y" in CRS units
        #[arg(long)]
        resolution: Option<String>,

        /// Download into a scratch directory instead of the cache
        #[arg(long)]
        no_cache: bool,

        /// Replace fill values with NaN on read
        #[arg(long)]
        masked: bool,

        /// Mask fill values and apply scale_factor/add_offset on read
        #[arg(long)]
        mask_and_scale: bool,
    },

    /// Show which files a request needs and which are already cached
    Plan(RequestArgs),

    /// Inspect or refresh the dataset catalog
    #[command(subcommand)]
    Manifest(ManifestCommand),

    /// Maintain the raster cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Subcommand, Debug)]
pub enum ManifestCommand {
    /// Re-check the published catalog hash and rebuild the table if needed
    Refresh {
        /// Rebuild even when the hash matches
        #[arg(long)]
        force: bool,
    },
    /// List annual and static product names
    Products,
    /// List country codes, optionally only those covered by a product
    Countries {
        #[arg(long)]
        product: Option<String>,
    },
    /// List the years available for an annual product
    Years {
        #[arg(long)]
        product: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Remove leftovers of interrupted downloads
    Repair,
    /// Delete cached rasters
    Purge {
        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Product name without a year, e.g. "ppp"
    #[arg(short, long)]
    pub product: String,

    /// Comma-separated ISO3 country codes
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["bbox", "geometry"])]
    pub countries: Vec<String>,

    /// Geographic bounding box "min_lon,min_lat,max_lon,max_lat"
    #[arg(long, conflicts_with = "geometry")]
    pub bbox: Option<String>,

    /// JSON file holding a geometry set
    #[arg(long)]
    pub geometry: Option<PathBuf>,

    /// Comma-separated years for annual products
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<i32>,

    /// JSON object of ISO3 code to [min_lon, min_lat, max_lon, max_lat]
    #[arg(long, env = "WORLDPOP_COUNTRY_EXTENTS")]
    pub country_extents: Option<PathBuf>,

    /// Download again even when a cached copy exists
    #[arg(long)]
    pub force: bool,
}

impl RequestArgs {
    pub fn area(&self) -> Result<AreaOfInterest> {
        if let Some(bbox) = &self.bbox {
            let bbox = BoundingBox::from_csv_string(bbox).context("invalid --bbox")?;
            return Ok(AreaOfInterest::BoundingBox(bbox));
        }
        if let Some(path) = &self.geometry {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let geometry: GeometrySet = serde_json::from_str(&text)
                .with_context(|| format!("parsing geometry {}", path.display()))?;
            return Ok(AreaOfInterest::Geometries(geometry));
        }
        if self.countries.is_empty() {
            bail!("one of --countries, --bbox or --geometry is required");
        }
        Ok(AreaOfInterest::Countries(self.countries.clone()))
    }

    pub fn request(&self) -> Result<RasterRequest> {
        let mut request = RasterRequest::new(self.product.clone(), self.area()?)
            .with_skip_download_if_exists(!self.force);
        if !self.years.is_empty() {
            request = request.with_years(self.years.clone());
        }
        Ok(request)
    }

    pub fn locator(&self) -> Result<Option<BoundsCountryLocator>> {
        let Some(path) = &self.country_extents else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let extents: BTreeMap<String, (f64, f64, f64, f64)> = serde_json::from_str(&text)
            .with_context(|| format!("parsing country extents {}", path.display()))?;
        Ok(Some(BoundsCountryLocator::from_extents(
            extents.iter().map(|(iso3, extent)| (iso3.as_str(), *extent)),
        )))
    }
}

pub fn merge_options(method: &str, resolution: Option<&str>) -> Result<MergeOptions> {
    let method = MergeMethod::from_str(method)
        .with_context(|| format!("unknown merge method '{method}'"))?;
    let mut options = MergeOptions::default().with_method(method);
    if let Some(resolution) = resolution {
        let (x, y) = resolution
            .split_once(',')
            .context("--resolution must be \"x,y\"")?;
        let x: f64 = x.trim().parse().context("invalid x resolution")?;
        let y: f64 = y.trim().parse().context("invalid y resolution")?;
        options = options.with_resolution(x, y);
    }
    Ok(options)
}

pub fn read_options(masked: bool, mask_and_scale: bool) -> ReadOptions {
    if mask_and_scale {
        ReadOptions::mask_and_scale()
    } else if masked {
        ReadOptions::masked()
    } else {
        ReadOptions::default()
    }
}
