#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Types shared by the importer pipeline and its binary.
//!
//! [`Address`] is the document written to the search engine for every
//! addressable node, addressable way and crossroad. [`ImportConfig`] is the
//! deserialized `geoindex.toml`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A WGS84 coordinate pair, serialized as an Elasticsearch `geo_point`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// One indexed document.
///
/// Hierarchy fields are empty strings when no polygon contains the
/// location; optional name variants are omitted entirely when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// `name` of the containing country relation, or the configured
    /// default country.
    pub country: String,
    /// Containing `place=city` relation.
    pub city: String,
    /// Containing `place=village` relation.
    pub village: String,
    /// Containing `place=town` relation.
    pub town: String,
    /// Containing `place=neighbourhood|suburb` way.
    pub district: String,
    /// Street-type token removed from `street` (e.g. `"улица"`).
    pub prefix: String,
    /// `addr:street` without its prefix.
    pub street: String,
    /// `addr:housenumber`.
    pub housenumber: String,
    /// `name`, or the joined street names of a crossroad.
    pub name: String,
    /// Set on synthesized crossroad records.
    pub intersection: bool,
    /// Point used for hierarchy lookup and `geo_point` queries.
    pub location: Location,
    /// Point for nodes and crossroads, line for ways.
    pub shape: geojson::Geometry,
    /// Name variants and postcode copied from the tags of the same key
    /// (`addr:postcode` for the postcode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub official_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
}

/// Which crossroad detector the importer runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntersectionStrategy {
    /// Shared nodes between differently named highways.
    #[default]
    NameCollision,
    /// Shared nodes plus polyline crossings.
    Geometric,
}

impl std::fmt::Display for IntersectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NameCollision => write!(f, "name_collision"),
            Self::Geometric => write!(f, "geometric"),
        }
    }
}

/// Importer configuration, read from `geoindex.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Local OSM PBF extract.
    pub osm_filename: PathBuf,
    /// Where `download` fetches the extract from.
    pub osm_url: Option<String>,
    /// Search engine base URLs.
    pub elastic_urls: Vec<String>,
    /// Public alias; created indices are named `<alias>-<unix secs>`.
    pub elastic_index: String,
    /// JSON document used as the index creation body.
    pub index_settings: Option<PathBuf>,
    /// Country written when no country polygon contains a record.
    pub default_country: String,
    /// Records per bulk request.
    pub bulk_batch_size: usize,
    /// Crossroad detector to run.
    pub intersection_strategy: IntersectionStrategy,
    /// Drop indices from earlier imports once this one is done.
    pub delete_stale_indices: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            osm_filename: PathBuf::from("data/osm/extract.osm.pbf"),
            osm_url: None,
            elastic_urls: vec!["http://localhost:9200".to_string()],
            elastic_index: "addresses".to_string(),
            index_settings: None,
            default_country: "KG".to_string(),
            bulk_batch_size: 10_000,
            intersection_strategy: IntersectionStrategy::default(),
            delete_stale_indices: true,
        }
    }
}

/// Lifecycle of one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    /// Created, not started.
    #[default]
    Idle,
    /// Decoding the extract and building the hierarchy.
    Parsing,
    /// Creating a fresh index and moving the alias onto it.
    IndexRotating,
    /// Export tasks are submitting bulk requests.
    Exporting,
    /// Every task submitted all of its records.
    Done,
    /// A stage failed; see the error returned by the run.
    Failed,
}

impl ImportState {
    /// Whether the run has stopped.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for ImportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Parsing => write!(f, "parsing"),
            Self::IndexRotating => write!(f, "index_rotating"),
            Self::Exporting => write!(f, "exporting"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The concurrent export tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportTask {
    /// Synthesized street intersections.
    Crossroads,
    /// Addressable nodes.
    Nodes,
    /// Addressable ways.
    Ways,
}

impl ExportTask {
    /// Every task, in launch order.
    pub const ALL: [Self; 3] = [Self::Crossroads, Self::Nodes, Self::Ways];

    /// Label used in logs and bulk buffer sources.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crossroads => "crossroads",
            Self::Nodes => "nodes",
            Self::Ways => "ways",
        }
    }

    /// Inverse of [`Self::as_str`].
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|task| task.as_str() == value)
    }
}

impl std::fmt::Display for ExportTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one export task wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Records submitted.
    pub records: usize,
    /// Bulk requests issued.
    pub batches: usize,
}

/// Outcome of a successful import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Index the alias now points at.
    pub index: String,
    /// Primitives decoded.
    pub primitives: u64,
    /// Per-task counts.
    pub tasks: BTreeMap<ExportTask, TaskSummary>,
    /// Indices removed after the export.
    pub deleted_indices: Vec<String>,
}

impl ImportSummary {
    /// Records submitted across all tasks.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.tasks.values().map(|task| task.records).sum()
    }
}
