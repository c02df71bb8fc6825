#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! OpenStreetMap ingestion for the geoindex importer.
//!
//! A single streaming pass over a PBF extract feeds every decoded
//! primitive through the [`classify`] predicates into a
//! [`store::StoreBuilder`]. When the pass has joined, the builder is frozen
//! into an immutable [`store::PrimitiveStore`] that the hierarchy,
//! crossroad, and export stages read without further locking.
//!
//! # Usage
//!
//! ```rust,no_run
//! # fn example() -> Result<(), geoindex_osm::OsmError> {
//! use geoindex_osm::pbf::{PbfSource, PrimitiveSource};
//! use geoindex_osm::progress::null_progress;
//! use geoindex_osm::store::StoreBuilder;
//!
//! let builder = StoreBuilder::new();
//! PbfSource::new("kyrgyzstan-latest.osm.pbf").parse(&builder, &null_progress())?;
//! let store = builder.freeze();
//! println!("{} addressable nodes", store.filtered_node_count());
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod pbf;
pub mod progress;
pub mod store;

pub use geoindex_osm_models as models;

/// Errors from decoding an OSM extract.
#[derive(Debug, thiserror::Error)]
pub enum OsmError {
    /// PBF file not found.
    #[error("OSM PBF file not found: {0}")]
    FileNotFound(String),

    /// PBF parsing error.
    #[error("OSM PBF parse error in {path}: {message}")]
    Parse {
        /// Path to the PBF file.
        path: String,
        /// Error description.
        message: String,
    },
}
