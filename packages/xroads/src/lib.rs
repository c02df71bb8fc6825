#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crossroad detection.
//!
//! Two strategies sit behind the [`IntersectionDetector`] trait:
//!
//! - [`NameCollision`] (the default): a node shared by highways carrying at
//!   least two distinct names is a crossroad. Linear in the number of
//!   way/node references.
//! - [`Geometric`]: everything [`NameCollision`] finds, plus points where
//!   street polylines cross without sharing a node. Candidate pairs come
//!   from an R-tree of way envelopes.
//!
//! [`NaiveGeometric`] produces the same output as [`Geometric`] by testing
//! every pair of streets; it only exists as a baseline for small inputs.

pub mod geometric;
pub mod name_collision;

use geo::Point;
use geoindex_osm::store::PrimitiveStore;

pub use geometric::{Geometric, NaiveGeometric};
pub use name_collision::NameCollision;

/// A point where differently named streets meet.
#[derive(Debug, Clone, PartialEq)]
pub struct Crossroad {
    /// Document ID: the decimal node ID for shared-node crossroads,
    /// `"<wayA>_<wayB>_<n>"` for geometric ones.
    pub id: String,
    /// Location (x = lon, y = lat).
    pub point: Point<f64>,
    /// Street names meeting here, deduplicated and sorted.
    pub names: Vec<String>,
}

/// A crossroad detection strategy.
pub trait IntersectionDetector: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Finds every crossroad in the store, in a deterministic order.
    fn detect(&self, store: &PrimitiveStore) -> Vec<Crossroad>;
}
