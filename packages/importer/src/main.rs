#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the geoindex importer.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use geoindex_cli_utils::IndicatifProgress;
use geoindex_importer::{DownloadError, config, download, ensure_extract, importer_from_config};

#[derive(Parser)]
#[command(name = "geoindex", about = "OpenStreetMap address importer")]
struct Cli {
    /// Path to the TOML config (defaults to `geoindex.toml`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the OSM extract into the search engine (default)
    Import {
        /// Override `osm_filename` from the config
        #[arg(long)]
        osm_file: Option<PathBuf>,
        /// Never download, even if the extract is missing
        #[arg(long)]
        no_download: bool,
    },
    /// Download the OSM extract from `osm_url`
    Download {
        /// Re-download even if the file already exists
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = geoindex_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = config::load(&config::config_path(cli.config))?;

    match cli.command.unwrap_or(Commands::Import {
        osm_file: None,
        no_download: false,
    }) {
        Commands::Import {
            osm_file,
            no_download,
        } => {
            if let Some(path) = osm_file {
                config.osm_filename = path;
            }
            if !no_download {
                ensure_extract(&config).await?;
            }

            let start = Instant::now();
            let progress = IndicatifProgress::records_bar(&multi, "Parsing OSM extract");
            let mut importer = importer_from_config(&config, progress)?;
            let summary = importer.run().await?;

            for (task, task_summary) in &summary.tasks {
                log::info!(
                    "  {task}: {} records in {} batch(es)",
                    task_summary.records,
                    task_summary.batches
                );
            }
            log::info!(
                "Imported {} records into {} in {:.1}s",
                summary.total_records(),
                summary.index,
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Download { force } => {
            let url = config.osm_url.as_deref().ok_or(DownloadError::NoUrl)?;
            if config.osm_filename.exists() && !force {
                log::info!(
                    "{} already exists, pass --force to re-download",
                    config.osm_filename.display()
                );
                return Ok(());
            }
            download::download_file(url, &config.osm_filename).await?;
        }
    }

    Ok(())
}
