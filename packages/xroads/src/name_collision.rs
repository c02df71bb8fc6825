//! Crossroads from the highway inverted index.

use std::collections::BTreeSet;

use geo::Point;
use geoindex_osm::store::PrimitiveStore;

use crate::{Crossroad, IntersectionDetector};

/// A node is a crossroad when the named highways through it carry more
/// than one distinct name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameCollision;

impl IntersectionDetector for NameCollision {
    fn name(&self) -> &'static str {
        "name_collision"
    }

    fn detect(&self, store: &PrimitiveStore) -> Vec<Crossroad> {
        let mut crossroads = Vec::new();

        for (node_id, way_ids) in store.inverted_index() {
            let ways: BTreeSet<i64> = way_ids.iter().copied().collect();
            if ways.len() < 2 {
                continue;
            }

            let names: BTreeSet<&str> = ways.iter().filter_map(|id| store.way_name(*id)).collect();
            if names.len() < 2 {
                continue;
            }

            let Some(node) = store.node(*node_id) else {
                log::debug!("Crossroad node {node_id} was never decoded");
                continue;
            };

            crossroads.push(Crossroad {
                id: node_id.to_string(),
                point: Point::new(node.lon, node.lat),
                names: names.into_iter().map(ToString::to_string).collect(),
            });
        }

        log::info!("Found {} shared-node crossroads", crossroads.len());
        crossroads
    }
}
