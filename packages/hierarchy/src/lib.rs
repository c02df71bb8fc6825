#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Administrative hierarchy for address enrichment.
//!
//! Materializes country, settlement, and district polygons from a frozen
//! [`PrimitiveStore`], indexes their envelopes in R-trees, and resolves a
//! point to the country / city / town / village / district containing it.
//!
//! Containment is a planar point-in-polygon test that includes the
//! boundary. No spherical correction is applied, which is fine at city
//! scale.
//!
//! When several polygons of one category contain a point, the one whose
//! key sorts first wins (country name, `"<name>+<place>"` for settlements,
//! district name; ties broken by OSM ID), so results never depend on map
//! iteration order.

use geo::{BoundingRect, Coord, Intersects, LineString, Point, Polygon};
use geoindex_osm::classify::PlaceKind;
use geoindex_osm::store::PrimitiveStore;
use geoindex_osm_models::{MemberType, Relation, Tags, Way};
use rstar::{AABB, RTree, RTreeObject};

/// Planar point-in-polygon test, inclusive of the boundary.
#[must_use]
pub fn contains(polygon: &Polygon<f64>, point: Point<f64>) -> bool {
    polygon.intersects(&point)
}

/// A named boundary polygon stored in the R-tree.
#[derive(Debug, Clone)]
pub struct Boundary {
    /// OSM ID of the relation or way the polygon came from.
    pub id: i64,
    /// Display name (`name` tag, or the decimal ID when unnamed).
    pub name: String,
    /// Ordering key; the smallest containing key wins.
    pub key: String,
    /// `place=*` kind, when the boundary came from a place.
    pub place: Option<PlaceKind>,
    /// Outer ring.
    pub polygon: Polygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl Boundary {
    fn new(
        id: i64,
        name: String,
        key: String,
        place: Option<PlaceKind>,
        ring: Vec<Coord<f64>>,
    ) -> Self {
        let polygon = Polygon::new(LineString::from(ring), vec![]);
        let envelope = compute_envelope(&polygon);
        Self {
            id,
            name,
            key,
            place,
            polygon,
            envelope,
        }
    }
}

impl RTreeObject for Boundary {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Boundaries of one category with an envelope index.
struct BoundaryIndex {
    tree: RTree<Boundary>,
}

impl BoundaryIndex {
    fn new(entries: Vec<Boundary>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Every boundary containing the point, best first.
    fn containing(&self, point: Point<f64>) -> Vec<&Boundary> {
        let query_env = AABB::from_point([point.x(), point.y()]);
        let mut hits: Vec<&Boundary> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| contains(&entry.polygon, point))
            .collect();
        hits.sort_by(|a, b| a.key.cmp(&b.key).then(a.id.cmp(&b.id)));
        hits
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

/// Where a point sits in the administrative hierarchy.
///
/// Empty strings mean no containing polygon was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    /// Country name.
    pub country: String,
    /// City name (`place=city`).
    pub city: String,
    /// Town name (`place=town`).
    pub town: String,
    /// Village name (`place=village` or `place=hamlet`).
    pub village: String,
    /// District name (`place=neighbourhood` or `place=suburb`).
    pub district: String,
}

/// Country, settlement, and district polygons ready for lookups.
pub struct Hierarchy {
    countries: BoundaryIndex,
    areas: BoundaryIndex,
    districts: BoundaryIndex,
}

impl Hierarchy {
    /// Builds every polygon from the store.
    ///
    /// Country and settlement polygons are walked from their relation
    /// members: node members contribute their point, way members every
    /// node of the way in order. Districts are plain ways. Member IDs that
    /// cannot be resolved are skipped, which may leave a polygon incomplete
    /// but never fails the build.
    #[must_use]
    pub fn build(store: &PrimitiveStore) -> Self {
        let mut skipped = 0usize;

        let countries: Vec<Boundary> = store
            .countries()
            .values()
            .filter_map(|relation| {
                let (ring, missing) = relation_ring(store, relation);
                skipped += missing;
                let name = display_name(relation.id, &relation.tags);
                boundary(relation.id, name.clone(), name, None, ring)
            })
            .collect();

        let areas: Vec<Boundary> = store
            .areas()
            .values()
            .filter_map(|relation| {
                let place = PlaceKind::parse(relation.tags.get("place"))?;
                let (ring, missing) = relation_ring(store, relation);
                skipped += missing;
                let name = display_name(relation.id, &relation.tags);
                let key = format!("{name}+{}", place.as_str());
                boundary(relation.id, name, key, Some(place), ring)
            })
            .collect();

        let districts: Vec<Boundary> = store
            .districts()
            .filter_map(|way| {
                let place = PlaceKind::parse(way.tags.get("place"))?;
                let (ring, missing) = way_ring(store, way);
                skipped += missing;
                let name = display_name(way.id, &way.tags);
                boundary(way.id, name.clone(), name, Some(place), ring)
            })
            .collect();

        if skipped > 0 {
            log::debug!("Skipped {skipped} unresolved boundary members");
        }

        log::info!(
            "Built hierarchy: {} countries, {} settlements, {} districts",
            countries.len(),
            areas.len(),
            districts.len()
        );

        Self {
            countries: BoundaryIndex::new(countries),
            areas: BoundaryIndex::new(areas),
            districts: BoundaryIndex::new(districts),
        }
    }

    /// Resolves the hierarchy fields for a point.
    #[must_use]
    pub fn resolve(&self, point: Point<f64>) -> Placement {
        let mut placement = Placement::default();

        if let Some(country) = self.countries.containing(point).first() {
            placement.country.clone_from(&country.name);
        }

        for area in self.areas.containing(point) {
            let slot = match area.place {
                Some(PlaceKind::City) => &mut placement.city,
                Some(PlaceKind::Town) => &mut placement.town,
                Some(PlaceKind::Village | PlaceKind::Hamlet) => &mut placement.village,
                _ => continue,
            };
            if slot.is_empty() {
                slot.clone_from(&area.name);
            }
        }

        if let Some(district) = self.districts.containing(point).first() {
            placement.district.clone_from(&district.name);
        }

        placement
    }

    /// Number of country polygons.
    #[must_use]
    pub fn country_count(&self) -> usize {
        self.countries.len()
    }

    /// Number of settlement polygons.
    #[must_use]
    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    /// Number of district polygons.
    #[must_use]
    pub fn district_count(&self) -> usize {
        self.districts.len()
    }
}

fn boundary(
    id: i64,
    name: String,
    key: String,
    place: Option<PlaceKind>,
    ring: Vec<Coord<f64>>,
) -> Option<Boundary> {
    if ring.len() < 3 {
        log::debug!("Skipping boundary {id} ({name}): {} vertices", ring.len());
        return None;
    }
    Some(Boundary::new(id, name, key, place, ring))
}

fn display_name(id: i64, tags: &Tags) -> String {
    tags.non_empty("name")
        .map_or_else(|| id.to_string(), ToString::to_string)
}

/// Walks a relation's members into a ring, returning it together with the
/// number of members that could not be resolved.
#[must_use]
pub fn relation_ring(store: &PrimitiveStore, relation: &Relation) -> (Vec<Coord<f64>>, usize) {
    let mut ring = Vec::new();
    let mut missing = 0usize;

    for member in &relation.members {
        match member.member_type {
            MemberType::Node => match store.node(member.id) {
                Some(node) => ring.push(Coord {
                    x: node.lon,
                    y: node.lat,
                }),
                None => missing += 1,
            },
            MemberType::Way => match store.way(member.id) {
                Some(way) => missing += push_way_nodes(store, way, &mut ring),
                None => missing += 1,
            },
            MemberType::Relation => missing += 1,
        }
    }

    (ring, missing)
}

/// A way's node sequence as a ring, plus the count of unresolved nodes.
#[must_use]
pub fn way_ring(store: &PrimitiveStore, way: &Way) -> (Vec<Coord<f64>>, usize) {
    let mut ring = Vec::with_capacity(way.node_refs.len());
    let missing = push_way_nodes(store, way, &mut ring);
    (ring, missing)
}

fn push_way_nodes(store: &PrimitiveStore, way: &Way, ring: &mut Vec<Coord<f64>>) -> usize {
    let mut missing = 0usize;
    for node_id in &way.node_refs {
        match store.node(*node_id) {
            Some(node) => ring.push(Coord {
                x: node.lon,
                y: node.lat,
            }),
            None => missing += 1,
        }
    }
    missing
}

/// Compute the bounding box envelope for a [`Polygon`].
fn compute_envelope(polygon: &Polygon<f64>) -> AABB<[f64; 2]> {
    polygon.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
