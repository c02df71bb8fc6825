//! In-memory primitive store built from a single decode pass.
//!
//! The decoder may call the ingestion callbacks from several worker
//! threads at once, so ingestion goes through a [`StoreBuilder`] that
//! serializes every callback behind one mutex. Once the pass has joined,
//! [`StoreBuilder::freeze`] hands back the plain [`PrimitiveStore`], which
//! is only ever read from then on and can be shared across export tasks
//! without locking.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

use geoindex_osm_models::{Node, Primitive, Relation, Way};

use crate::classify;

/// Callbacks invoked by a decoder for every primitive it yields.
///
/// Implementations must be `Send + Sync`: decoders are free to call them
/// concurrently from several threads.
pub trait OsmHandler: Send + Sync {
    /// Called once per decoded node.
    fn read_node(&self, node: Node);
    /// Called once per decoded way.
    fn read_way(&self, way: Way);
    /// Called once per decoded relation.
    fn read_relation(&self, relation: Relation);

    /// Dispatches a primitive to the matching callback.
    fn read_primitive(&self, primitive: Primitive) {
        match primitive {
            Primitive::Node(node) => self.read_node(node),
            Primitive::Way(way) => self.read_way(way),
            Primitive::Relation(relation) => self.read_relation(relation),
        }
    }
}

/// Counters collected while ingesting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Nodes seen.
    pub nodes: u64,
    /// Ways seen.
    pub ways: u64,
    /// Relations seen.
    pub relations: u64,
}

/// Every primitive the importer needs, keyed by OSM ID.
///
/// All maps are ordered, so every enumeration over the store is
/// deterministic.
#[derive(Debug, Default)]
pub struct PrimitiveStore {
    nodes: BTreeMap<i64, Node>,
    filtered_nodes: BTreeSet<i64>,
    full_ways: BTreeMap<i64, Way>,
    ways: BTreeSet<i64>,
    highways: BTreeSet<i64>,
    way_names: BTreeMap<i64, String>,
    inverted_index: BTreeMap<i64, Vec<i64>>,
    areas: BTreeMap<i64, Relation>,
    districts: BTreeSet<i64>,
    countries: BTreeMap<i64, Relation>,
    stats: IngestStats,
}

impl PrimitiveStore {
    fn ingest_node(&mut self, node: Node) {
        self.stats.nodes += 1;
        if classify::classify_node(&node) {
            self.filtered_nodes.insert(node.id);
        }
        self.nodes.insert(node.id, node);
    }

    fn ingest_way(&mut self, way: Way) {
        self.stats.ways += 1;

        if classify::is_district_place(way.tags.get("place")) {
            self.districts.insert(way.id);
        }
        if classify::classify_way(&way) {
            self.ways.insert(way.id);
        }

        if classify::is_highway(&way) {
            self.highways.insert(way.id);

            if let Some(name) = classify::preferred_way_name(&way.tags) {
                self.way_names.insert(way.id, name.to_string());
                for node_id in &way.node_refs {
                    self.inverted_index
                        .entry(*node_id)
                        .or_default()
                        .push(way.id);
                }
            }
        }

        self.full_ways.insert(way.id, way);
    }

    fn ingest_relation(&mut self, relation: Relation) {
        self.stats.relations += 1;

        let is_country = relation.tags.get("admin_level") == "2";
        let is_area = classify::is_area_place(relation.tags.get("place"));

        match (is_country, is_area) {
            (true, true) => {
                self.countries.insert(relation.id, relation.clone());
                self.areas.insert(relation.id, relation);
            }
            (true, false) => {
                self.countries.insert(relation.id, relation);
            }
            (false, true) => {
                self.areas.insert(relation.id, relation);
            }
            (false, false) => {}
        }
    }

    /// Looks up any decoded node.
    #[must_use]
    pub fn node(&self, id: i64) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Looks up any decoded way.
    #[must_use]
    pub fn way(&self, id: i64) -> Option<&Way> {
        self.full_ways.get(&id)
    }

    /// Number of decoded nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of decoded ways.
    #[must_use]
    pub fn way_count(&self) -> usize {
        self.full_ways.len()
    }

    /// Nodes classified as addressable, in ID order.
    pub fn filtered_nodes(&self) -> impl Iterator<Item = &Node> {
        self.filtered_nodes.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Number of addressable nodes.
    #[must_use]
    pub fn filtered_node_count(&self) -> usize {
        self.filtered_nodes.len()
    }

    /// Ways classified as addressable, in ID order.
    pub fn filtered_ways(&self) -> impl Iterator<Item = &Way> {
        self.ways.iter().filter_map(|id| self.full_ways.get(id))
    }

    /// Number of addressable ways.
    #[must_use]
    pub fn filtered_way_count(&self) -> usize {
        self.ways.len()
    }

    /// Every highway way, named or not, in ID order.
    pub fn highways(&self) -> impl Iterator<Item = &Way> {
        self.highways.iter().filter_map(|id| self.full_ways.get(id))
    }

    /// Inverted-index name of a highway way.
    #[must_use]
    pub fn way_name(&self, way_id: i64) -> Option<&str> {
        self.way_names.get(&way_id).map(String::as_str)
    }

    /// All named highways and their inverted-index names.
    #[must_use]
    pub const fn way_names(&self) -> &BTreeMap<i64, String> {
        &self.way_names
    }

    /// Node ID to the named highways passing through it.
    ///
    /// A way ID may appear more than once for a node when the way visits
    /// the node twice (closed rings).
    #[must_use]
    pub const fn inverted_index(&self) -> &BTreeMap<i64, Vec<i64>> {
        &self.inverted_index
    }

    /// Settlement relations (`place=city|town|village|hamlet`).
    #[must_use]
    pub const fn areas(&self) -> &BTreeMap<i64, Relation> {
        &self.areas
    }

    /// Country relations (`admin_level=2`).
    #[must_use]
    pub const fn countries(&self) -> &BTreeMap<i64, Relation> {
        &self.countries
    }

    /// District ways (`place=neighbourhood|suburb`), in ID order.
    pub fn districts(&self) -> impl Iterator<Item = &Way> {
        self.districts.iter().filter_map(|id| self.full_ways.get(id))
    }

    /// Counters collected during ingestion.
    #[must_use]
    pub const fn stats(&self) -> IngestStats {
        self.stats
    }
}

/// Mutable, thread-safe ingestion front for a [`PrimitiveStore`].
#[derive(Debug, Default)]
pub struct StoreBuilder {
    store: Mutex<PrimitiveStore>,
}

impl StoreBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends ingestion and returns the read-only store.
    ///
    /// Consuming `self` guarantees no callback can still be running.
    #[must_use]
    pub fn freeze(self) -> PrimitiveStore {
        self.store
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn with_store(&self, f: impl FnOnce(&mut PrimitiveStore)) {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut store);
    }
}

impl OsmHandler for StoreBuilder {
    fn read_node(&self, node: Node) {
        self.with_store(|store| store.ingest_node(node));
    }

    fn read_way(&self, way: Way) {
        self.with_store(|store| store.ingest_way(way));
    }

    fn read_relation(&self, relation: Relation) {
        self.with_store(|store| store.ingest_relation(relation));
    }
}

/// Builds a frozen store from an in-memory list of primitives.
#[must_use]
pub fn store_from_primitives(primitives: impl IntoIterator<Item = Primitive>) -> PrimitiveStore {
    let builder = StoreBuilder::new();
    for primitive in primitives {
        builder.read_primitive(primitive);
    }
    builder.freeze()
}
