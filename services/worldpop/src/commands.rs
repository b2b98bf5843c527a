//! Subcommand handlers.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::info;

use manifest::RefreshOutcome;
use worldpop::{
    purge_cache, repair_cache, GeoTiffWriter, MergedRaster, WorldPop, WorldPopConfig,
    WorldPopError,
};

use crate::args::{
    merge_options, read_options, CacheCommand, Cli, Command, ManifestCommand, RequestArgs,
};

fn config(cli: &Cli) -> Result<WorldPopConfig> {
    let mut config = WorldPopConfig::from_env()?;
    if let Some(dir) = &cli.cache_dir {
        config = config.with_cache_dir(dir);
    }
    if let Some(n) = cli.max_concurrency {
        if n == 0 {
            return Err(WorldPopError::Config("max concurrency must be at least 1".into()).into());
        }
        config.max_concurrency = n;
    }
    Ok(config)
}

fn client(config: WorldPopConfig, request: Option<&RequestArgs>) -> Result<WorldPop> {
    let mut client = WorldPop::new(config)?;
    if let Some(locator) = request.map(RequestArgs::locator).transpose()?.flatten() {
        client = client.with_locator(Arc::new(locator));
    }
    Ok(client)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = config(&cli)?;
    info!(cache_dir = %config.cache_dir.display(), "Using cache");

    match cli.command {
        Command::Fetch(args) => {
            let client = client(config, Some(&args))?;
            let paths = client.download(&args.request()?).await?;
            info!(files = paths.len(), "Fetch complete");
            for path in paths {
                println!("{}", path.display());
            }
        }

        Command::Plan(args) => {
            let client = client(config, Some(&args))?;
            let plan = client.plan(&args.request()?).await?;
            print_json(&serde_json::to_value(&plan)?)?;
        }

        Command::Raster {
            request,
            output,
            method,
            resolution,
            no_cache,
            masked,
            mask_and_scale,
        } => {
            let client = client(config, Some(&request))?;
            let raster_request = request
                .request()?
                .with_cache_downloads(!no_cache)
                .with_skip_download_if_exists(!request.force && !no_cache)
                .with_merge_options(merge_options(&method, resolution.as_deref())?)
                .with_read_options(read_options(masked, mask_and_scale));

            let merged = client.raster(&raster_request).await?;
            let written = GeoTiffWriter::new()
                .write_merged(&merged, &output)
                .map_err(WorldPopError::from)?;
            print_json(&summary(&merged, &written))?;
        }

        Command::Manifest(cmd) => {
            let client = client(config, None)?;
            manifest(&client, cmd).await?;
        }

        Command::Cache(cmd) => match cmd {
            CacheCommand::Repair => {
                let removed = repair_cache(&config.cache_dir);
                println!("removed {removed} incomplete download(s)");
            }
            CacheCommand::Purge { dry_run } => {
                let report = purge_cache(&config.cache_dir, dry_run);
                print_json(&serde_json::to_value(&report)?)?;
            }
        },
    }
    Ok(())
}

async fn manifest(client: &WorldPop, cmd: ManifestCommand) -> Result<()> {
    match cmd {
        ManifestCommand::Refresh { force } => {
            match client.store().refresh_if_stale(force).await? {
                RefreshOutcome::UpToDate => println!("manifest is up to date"),
                RefreshOutcome::Refreshed { entries, hash } => {
                    println!("manifest refreshed: {entries} entries (md5 {hash})")
                }
                RefreshOutcome::KeptStale { reason } => {
                    println!("kept cached manifest: {reason}")
                }
            }
        }
        ManifestCommand::Products => {
            let manifest = client.store().load().await?;
            print_json(&json!({
                "annual": manifest.annual_product_names(),
                "static": manifest.static_product_names(),
            }))?;
        }
        ManifestCommand::Countries { product } => {
            let manifest = client.store().load().await?;
            let countries = match product {
                Some(product) => manifest.countries_for_product(&product),
                None => manifest.iso_codes().to_vec(),
            };
            println!("{}", countries.join("\n"));
        }
        ManifestCommand::Years { product } => {
            let manifest = client.store().load().await?;
            let years: Vec<String> = manifest
                .years_for_product(&product)
                .iter()
                .map(i32::to_string)
                .collect();
            println!("{}", years.join("\n"));
        }
    }
    Ok(())
}

fn summary(merged: &MergedRaster, written: &[std::path::PathBuf]) -> serde_json::Value {
    let layers: Vec<_> = merged
        .layers()
        .into_iter()
        .map(|(year, raster)| {
            json!({
                "year": year,
                "width": raster.width,
                "height": raster.height,
                "bands": raster.bands,
                "crs": raster.crs.epsg(),
                "bounds": raster.bounds(),
                "valid_pixels": raster.valid_count(),
            })
        })
        .collect();
    json!({ "layers": layers, "files": written })
}
