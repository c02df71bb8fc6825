//! Turning primitives and crossroads into [`Address`] documents.

use geo::{Centroid as _, Coord, LineString, Point};
use geoindex_hierarchy::Hierarchy;
use geoindex_importer_models::{Address, Location};
use geoindex_osm::store::PrimitiveStore;
use geoindex_osm_models::{Node, Tags, Way};
use geoindex_xroads::Crossroad;

/// Street-type words removed from street names, in matching order.
pub const STREET_PREFIXES: &[&str] = &["улица", "проспект", "бульвар", "переулок"];

/// Splits a street-type word off a street name.
///
/// Returns `(prefix, street)`. A leading prefix wins; failing that, a
/// prefix standing alone anywhere in the name (`"Манаса улица"`) is
/// removed. Names without a known prefix come back unchanged with an
/// empty prefix.
#[must_use]
pub fn strip_prefix(street: &str) -> (String, String) {
    let trimmed = street.trim();

    for prefix in STREET_PREFIXES {
        if let Some(rest) = trimmed.strip_prefix(prefix)
            && (rest.is_empty() || rest.starts_with(char::is_whitespace))
        {
            return ((*prefix).to_string(), rest.trim().to_string());
        }
    }

    for prefix in STREET_PREFIXES {
        if trimmed.split_whitespace().any(|word| word == *prefix) {
            let rest: Vec<&str> = trimmed
                .split_whitespace()
                .filter(|word| word != prefix)
                .collect();
            return ((*prefix).to_string(), rest.join(" "));
        }
    }

    (String::new(), street.to_string())
}

/// Removes every street-type word from a name and collapses whitespace.
#[must_use]
pub fn strip_all_prefixes(name: &str) -> String {
    name.split_whitespace()
        .filter(|word| !STREET_PREFIXES.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds documents against a frozen store and its hierarchy.
pub struct AddressResolver<'a> {
    store: &'a PrimitiveStore,
    hierarchy: &'a Hierarchy,
    default_country: &'a str,
}

impl<'a> AddressResolver<'a> {
    #[must_use]
    pub const fn new(
        store: &'a PrimitiveStore,
        hierarchy: &'a Hierarchy,
        default_country: &'a str,
    ) -> Self {
        Self {
            store,
            hierarchy,
            default_country,
        }
    }

    /// Document for an addressable node, located at the node itself.
    #[must_use]
    pub fn node(&self, node: &Node) -> Address {
        let point = Point::new(node.lon, node.lat);
        self.to_address(&node.tags, point, point_geometry(point))
    }

    /// Document for an addressable way.
    ///
    /// The location is the length-weighted centroid of the way's line, or
    /// its only vertex. Unresolvable node references are skipped; `None`
    /// means no vertex resolved at all.
    #[must_use]
    pub fn way(&self, way: &Way) -> Option<Address> {
        let coords: Vec<Coord<f64>> = way
            .node_refs
            .iter()
            .filter_map(|id| self.store.node(*id))
            .map(|node| Coord {
                x: node.lon,
                y: node.lat,
            })
            .collect();

        let (point, shape) = match coords.as_slice() {
            [] => {
                log::debug!("Way {} has no resolvable vertex", way.id);
                return None;
            }
            [only] => (Point(*only), point_geometry(Point(*only))),
            [first, ..] => {
                let shape = line_geometry(&coords);
                let line = LineString::new(coords.clone());
                (line.centroid().unwrap_or(Point(*first)), shape)
            }
        };

        Some(self.to_address(&way.tags, point, shape))
    }

    /// Synthesized document for a crossroad.
    #[must_use]
    pub fn crossroad(&self, crossroad: &Crossroad) -> Address {
        let mut address =
            self.to_address(&Tags::new(), crossroad.point, point_geometry(crossroad.point));
        address.name = strip_all_prefixes(&crossroad.names.join(" "));
        address.intersection = true;
        address
    }

    fn to_address(&self, tags: &Tags, point: Point<f64>, shape: geojson::Geometry) -> Address {
        let placement = self.hierarchy.resolve(point);
        let (prefix, street) = match tags.non_empty("addr:street") {
            Some(street) => strip_prefix(street),
            None => (String::new(), String::new()),
        };
        let optional = |key: &str| tags.non_empty(key).map(ToString::to_string);

        Address {
            country: if placement.country.is_empty() {
                self.default_country.to_string()
            } else {
                placement.country
            },
            city: placement.city,
            village: placement.village,
            town: placement.town,
            district: placement.district,
            prefix,
            street,
            housenumber: tags.get("addr:housenumber").to_string(),
            name: tags.get("name").to_string(),
            intersection: false,
            location: Location {
                lat: point.y(),
                lon: point.x(),
            },
            shape,
            old_name: optional("old_name"),
            alt_name: optional("alt_name"),
            int_name: optional("int_name"),
            official_name: optional("official_name"),
            short_name: optional("short_name"),
            postcode: optional("addr:postcode"),
        }
    }
}

fn point_geometry(point: Point<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::Point(vec![point.x(), point.y()]))
}

fn line_geometry(coords: &[Coord<f64>]) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::LineString(
        coords.iter().map(|c| vec![c.x, c.y]).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use geoindex_osm::store::store_from_primitives;
    use geoindex_osm_models::{Member, MemberType, Primitive, Relation};

    use super::*;

    fn node(id: i64, lat: f64, lon: f64, tags: &[(&str, &str)]) -> Primitive {
        Primitive::Node(Node {
            id,
            lat,
            lon,
            tags: tags.iter().copied().collect(),
        })
    }

    fn way(id: i64, tags: &[(&str, &str)], node_refs: &[i64]) -> Primitive {
        Primitive::Way(Way {
            id,
            tags: tags.iter().copied().collect(),
            node_refs: node_refs.to_vec(),
        })
    }

    /// A 10x10 degree city polygon with corners as nodes 901..=904.
    fn city_fixture(mut extra: Vec<Primitive>) -> PrimitiveStore {
        let mut primitives = vec![
            node(901, 0.0, 0.0, &[]),
            node(902, 10.0, 0.0, &[]),
            node(903, 10.0, 10.0, &[]),
            node(904, 0.0, 10.0, &[]),
            way(950, &[], &[901, 902, 903, 904, 901]),
            Primitive::Relation(Relation {
                id: 990,
                tags: [("place", "city"), ("name", "Бишкек")].into_iter().collect(),
                members: vec![Member {
                    id: 950,
                    member_type: MemberType::Way,
                    role: "outer".to_string(),
                }],
            }),
        ];
        primitives.append(&mut extra);
        store_from_primitives(primitives)
    }

    #[test]
    fn strips_leading_prefix() {
        assert_eq!(
            strip_prefix("улица Манаса"),
            ("улица".to_string(), "Манаса".to_string())
        );
        assert_eq!(
            strip_prefix("  проспект   Чуй "),
            ("проспект".to_string(), "Чуй".to_string())
        );
    }

    #[test]
    fn strips_trailing_prefix_word() {
        assert_eq!(
            strip_prefix("Манаса улица"),
            ("улица".to_string(), "Манаса".to_string())
        );
    }

    #[test]
    fn prefix_must_be_a_whole_word() {
        assert_eq!(
            strip_prefix("улицаМанаса"),
            (String::new(), "улицаМанаса".to_string())
        );
    }

    #[test]
    fn unknown_prefix_leaves_street_unchanged() {
        assert_eq!(
            strip_prefix("Sovetskaya"),
            (String::new(), "Sovetskaya".to_string())
        );
    }

    #[test]
    fn crossroad_names_lose_every_prefix() {
        assert_eq!(
            strip_all_prefixes("улица Манаса  проспект Чуй"),
            "Манаса Чуй"
        );
    }

    #[test]
    fn node_address_resolves_hierarchy_and_tags() {
        let store = city_fixture(vec![node(
            1,
            5.0,
            5.0,
            &[
                ("addr:street", "улица Манаса"),
                ("addr:housenumber", "12"),
                ("addr:postcode", "720001"),
                ("old_name", "Старая"),
            ],
        )]);
        let hierarchy = Hierarchy::build(&store);
        let resolver = AddressResolver::new(&store, &hierarchy, "KG");

        let address = resolver.node(store.node(1).unwrap());

        assert_eq!(address.country, "KG");
        assert_eq!(address.city, "Бишкек");
        assert_eq!(address.prefix, "улица");
        assert_eq!(address.street, "Манаса");
        assert_eq!(address.housenumber, "12");
        assert_eq!(address.postcode.as_deref(), Some("720001"));
        assert_eq!(address.old_name.as_deref(), Some("Старая"));
        assert_eq!(address.alt_name, None);
        assert!(!address.intersection);
        assert_eq!(
            address.location,
            Location {
                lat: 5.0,
                lon: 5.0
            }
        );
        assert_eq!(
            address.shape.value,
            geojson::Value::Point(vec![5.0, 5.0])
        );
    }

    #[test]
    fn outside_every_polygon_keeps_default_country_only() {
        let store = city_fixture(vec![node(1, 50.0, 50.0, &[("addr:housenumber", "3")])]);
        let hierarchy = Hierarchy::build(&store);
        let resolver = AddressResolver::new(&store, &hierarchy, "KG");

        let address = resolver.node(store.node(1).unwrap());
        assert_eq!(address.country, "KG");
        assert!(address.city.is_empty());
        assert!(address.district.is_empty());
    }

    #[test]
    fn way_location_is_line_centroid() {
        let store = city_fixture(vec![
            node(1, 2.0, 2.0, &[]),
            node(2, 2.0, 4.0, &[]),
            node(3, 2.0, 8.0, &[]),
            way(10, &[("building", "yes"), ("name", "ЦУМ")], &[1, 2, 3]),
        ]);
        let hierarchy = Hierarchy::build(&store);
        let resolver = AddressResolver::new(&store, &hierarchy, "KG");

        let address = resolver.way(store.way(10).unwrap()).unwrap();

        assert!((address.location.lat - 2.0).abs() < 1e-9);
        assert!((address.location.lon - 5.0).abs() < 1e-9);
        assert_eq!(address.name, "ЦУМ");
        assert_eq!(address.city, "Бишкек");
        assert_eq!(
            address.shape.value,
            geojson::Value::LineString(vec![vec![2.0, 2.0], vec![4.0, 2.0], vec![8.0, 2.0]])
        );
    }

    #[test]
    fn single_vertex_way_uses_that_vertex() {
        let store = city_fixture(vec![
            node(1, 3.0, 4.0, &[]),
            way(10, &[("building", "yes"), ("name", "Kiosk")], &[1, 77]),
        ]);
        let hierarchy = Hierarchy::build(&store);
        let resolver = AddressResolver::new(&store, &hierarchy, "KG");

        let address = resolver.way(store.way(10).unwrap()).unwrap();
        assert_eq!(
            address.location,
            Location {
                lat: 3.0,
                lon: 4.0
            }
        );
        assert_eq!(address.shape.value, geojson::Value::Point(vec![4.0, 3.0]));
    }

    #[test]
    fn way_without_vertices_is_skipped() {
        let store = city_fixture(vec![way(10, &[("building", "yes"), ("name", "Ghost")], &[77, 78])]);
        let hierarchy = Hierarchy::build(&store);
        let resolver = AddressResolver::new(&store, &hierarchy, "KG");

        assert!(resolver.way(store.way(10).unwrap()).is_none());
    }

    #[test]
    fn crossroad_address_joins_names() {
        let store = city_fixture(vec![]);
        let hierarchy = Hierarchy::build(&store);
        let resolver = AddressResolver::new(&store, &hierarchy, "KG");

        let address = resolver.crossroad(&Crossroad {
            id: "1".to_string(),
            point: Point::new(5.0, 5.0),
            names: vec!["Lenina".to_string(), "Sovetskaya".to_string()],
        });

        assert_eq!(address.name, "Lenina Sovetskaya");
        assert!(address.intersection);
        assert_eq!(address.city, "Бишкек");
        assert!(address.street.is_empty());
    }
}
