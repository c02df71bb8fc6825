#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Imports an OpenStreetMap extract into a search engine as address
//! documents.
//!
//! One run decodes the extract into a frozen primitive store, builds the
//! administrative hierarchy, rotates the search index, and exports three
//! record families concurrently: crossroads, addressable nodes, and
//! addressable ways. See [`pipeline::Importer`] for the state machine.

pub mod address;
pub mod config;
pub mod download;
pub mod export;
pub mod pipeline;

use std::sync::Arc;

use geoindex_importer_models::{ExportTask, ImportConfig};
use geoindex_osm::OsmError;
use geoindex_osm::pbf::PbfSource;
use geoindex_osm::progress::ProgressCallback;
use geoindex_search::{ElasticClient, SearchError};

pub use config::ConfigError;
pub use download::DownloadError;
pub use pipeline::{ImportOptions, Importer};

/// Errors from an import run.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The extract could not be decoded.
    #[error("Decode error: {0}")]
    Osm(#[from] OsmError),

    /// Index rotation or setup against the search engine failed.
    #[error("Search engine error: {0}")]
    Search(#[from] SearchError),

    /// A bulk write failed.
    #[error("Export of {task} failed: {source}")]
    Export {
        /// Task whose write failed.
        task: ExportTask,
        /// Underlying client error.
        source: SearchError,
    },

    /// A record could not be serialized.
    #[error("Failed to serialize {task} records: {source}")]
    Serialize {
        /// Task being serialized.
        task: ExportTask,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The task stopped because a sibling failed.
    #[error("Export of {0} cancelled after another task failed")]
    Cancelled(ExportTask),

    /// [`Importer::start`] was called twice.
    #[error("Import already started")]
    AlreadyStarted,

    /// [`Importer::wait_stop`] was called without a running import.
    #[error("Import was never started")]
    NotStarted,

    /// A background task panicked or was aborted.
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The extract could not be downloaded.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Downloads the extract if it is missing locally and a URL is configured.
///
/// Returns `true` if a download happened.
///
/// # Errors
///
/// Returns an error if the download fails.
pub async fn ensure_extract(config: &ImportConfig) -> Result<bool, DownloadError> {
    if config.osm_filename.exists() {
        return Ok(false);
    }

    let Some(url) = &config.osm_url else {
        log::warn!(
            "{} does not exist and no osm_url is configured",
            config.osm_filename.display()
        );
        return Ok(false);
    };

    download::download_file(url, &config.osm_filename).await?;
    Ok(true)
}

/// Builds an importer reading the configured PBF extract into
/// Elasticsearch.
///
/// # Errors
///
/// Returns an error if the index settings file cannot be read or no
/// search engine URL is configured.
pub fn importer_from_config(
    config: &ImportConfig,
    progress: Arc<dyn ProgressCallback>,
) -> Result<Importer, ImportError> {
    let client = ElasticClient::new(config::elastic_config(config)?)?;

    Ok(Importer::new(
        Arc::new(PbfSource::new(&config.osm_filename)),
        Arc::new(client),
        ImportOptions::from(config),
        progress,
    ))
}
