//! Crossroads from polyline geometry.
//!
//! Streets that cross without sharing a node (missing junction nodes,
//! bridges drawn without layers) never show up in the inverted index.
//! These detectors intersect the polylines segment by segment and add
//! every crossing point the shared-node pass did not already produce.

use std::collections::BTreeSet;

use geo::line_intersection::line_intersection;
use geo::{Coord, Line, LineIntersection, Point};
use geoindex_osm::classify;
use geoindex_osm::store::PrimitiveStore;
use rstar::{AABB, RTree, RTreeObject};

use crate::name_collision::NameCollision;
use crate::{Crossroad, IntersectionDetector};

/// Crossing points closer than this (in degrees) are the same point.
const COORD_PRECISION: f64 = 1e7;

/// R-tree accelerated geometric detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Geometric;

impl IntersectionDetector for Geometric {
    fn name(&self) -> &'static str {
        "geometric"
    }

    fn detect(&self, store: &PrimitiveStore) -> Vec<Crossroad> {
        detect_with(store, indexed_pairs)
    }
}

/// All-pairs geometric detection; same output as [`Geometric`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveGeometric;

impl IntersectionDetector for NaiveGeometric {
    fn name(&self) -> &'static str {
        "naive_geometric"
    }

    fn detect(&self, store: &PrimitiveStore) -> Vec<Crossroad> {
        detect_with(store, all_pairs)
    }
}

/// A named highway resolved to coordinates.
struct Street<'a> {
    id: i64,
    /// Identity used to tell streets apart, `addr:street` first.
    key: &'a str,
    /// Name written into the crossroad, `name` first.
    name: &'a str,
    coords: Vec<Coord<f64>>,
    envelope: AABB<[f64; 2]>,
}

/// Envelope entry pointing back into the street list.
struct StreetEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for StreetEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn streets(store: &PrimitiveStore) -> Vec<Street<'_>> {
    store
        .highways()
        .filter_map(|way| {
            let key = store.way_name(way.id)?;
            let name = classify::display_way_name(&way.tags).unwrap_or(key);
            let coords: Vec<Coord<f64>> = way
                .node_refs
                .iter()
                .filter_map(|id| store.node(*id))
                .map(|node| Coord {
                    x: node.lon,
                    y: node.lat,
                })
                .collect();
            if coords.len() < 2 {
                return None;
            }
            let points: Vec<[f64; 2]> = coords.iter().map(|c| [c.x, c.y]).collect();
            let envelope = AABB::from_points(points.iter());
            Some(Street {
                id: way.id,
                key,
                name,
                coords,
                envelope,
            })
        })
        .collect()
}

/// Candidate pairs `(i, j)`, `i < j`, whose envelopes overlap.
fn indexed_pairs(streets: &[Street<'_>]) -> Vec<(usize, usize)> {
    let tree = RTree::bulk_load(
        streets
            .iter()
            .enumerate()
            .map(|(index, street)| StreetEnvelope {
                index,
                envelope: street.envelope,
            })
            .collect(),
    );

    let mut pairs: Vec<(usize, usize)> = streets
        .iter()
        .enumerate()
        .flat_map(|(i, street)| {
            tree.locate_in_envelope_intersecting(&street.envelope)
                .filter(move |other| other.index > i)
                .map(move |other| (i, other.index))
        })
        .collect();
    pairs.sort_unstable();
    pairs
}

fn all_pairs(streets: &[Street<'_>]) -> Vec<(usize, usize)> {
    (0..streets.len())
        .flat_map(|i| ((i + 1)..streets.len()).map(move |j| (i, j)))
        .collect()
}

fn detect_with(
    store: &PrimitiveStore,
    pairs: impl FnOnce(&[Street<'_>]) -> Vec<(usize, usize)>,
) -> Vec<Crossroad> {
    let mut crossroads = NameCollision.detect(store);
    let mut seen: BTreeSet<(i64, i64)> =
        crossroads.iter().map(|c| point_key(c.point.0)).collect();

    let streets = streets(store);
    let pairs = pairs(&streets);
    log::debug!(
        "Testing {} candidate pairs among {} streets",
        pairs.len(),
        streets.len()
    );

    let shared_node_count = crossroads.len();

    for (i, j) in pairs {
        let (a, b) = (&streets[i], &streets[j]);
        if a.key == b.key {
            continue;
        }

        let (first, second) = if a.id <= b.id { (a, b) } else { (b, a) };
        let mut ordinal = 0usize;

        for point in crossings(&first.coords, &second.coords) {
            if !seen.insert(point_key(point)) {
                continue;
            }

            let mut names = vec![first.name.to_string(), second.name.to_string()];
            names.sort();

            crossroads.push(Crossroad {
                id: format!("{}_{}_{ordinal}", first.id, second.id),
                point: Point(point),
                names,
            });
            ordinal += 1;
        }
    }

    log::info!(
        "Found {} geometric crossroads",
        crossroads.len() - shared_node_count
    );

    crossroads
}

/// Every single-point crossing between two polylines, in segment order.
///
/// Collinear overlaps have no single crossing point and are ignored.
fn crossings(a: &[Coord<f64>], b: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut points = Vec::new();

    for seg_a in a.windows(2) {
        let line_a = Line::new(seg_a[0], seg_a[1]);
        for seg_b in b.windows(2) {
            let line_b = Line::new(seg_b[0], seg_b[1]);
            if let Some(LineIntersection::SinglePoint { intersection, .. }) =
                line_intersection(line_a, line_b)
            {
                points.push(intersection);
            }
        }
    }

    points
}

#[allow(clippy::cast_possible_truncation)]
fn point_key(coord: Coord<f64>) -> (i64, i64) {
    (
        (coord.x * COORD_PRECISION).round() as i64,
        (coord.y * COORD_PRECISION).round() as i64,
    )
}
