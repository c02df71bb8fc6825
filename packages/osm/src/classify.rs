//! Tag predicates deciding what a primitive is used for.
//!
//! Every rule here looks at a single primitive's tags only. The decoder
//! gives no ordering guarantee between nodes, ways, and relations, so no
//! predicate may depend on another primitive having been seen.

use geoindex_osm_models::{Node, Tags, Way};

/// Tags that make a primitive addressable.
///
/// The first element is the key that must be present with a non-empty
/// value. The second element is either empty (presence of the key alone
/// qualifies) or a second key that must also be non-empty.
pub const ADDRESS_TAGS: &[(&str, &str)] = &[
    ("addr:street", "addr:housenumber"),
    ("addr:housenumber", ""),
    ("amenity", "name"),
    ("building", "name"),
    ("shop", "name"),
    ("office", "name"),
    ("public_transport", "name"),
    ("cuisine", "name"),
    ("railway", "name"),
    ("sport", "name"),
    ("natural", "name"),
    ("tourism", "name"),
    ("leisure", "name"),
    ("historic", "name"),
    ("man_made", "name"),
    ("landuse", "name"),
    ("waterway", "name"),
    ("aerialway", "name"),
    ("aeroway", "name"),
    ("craft", "name"),
    ("military", "name"),
];

/// `highway=*` values treated as streets for crossroad detection.
pub const HIGHWAY_TYPES: &[&str] = &[
    "motorway",
    "trunk",
    "primary",
    "secondary",
    "residential",
    "service",
    "tertiary",
    "road",
];

/// Whether the tags satisfy any rule in [`ADDRESS_TAGS`].
#[must_use]
pub fn is_addressable(tags: &Tags) -> bool {
    ADDRESS_TAGS.iter().any(|(key, also)| {
        !tags.get(key).is_empty() && (also.is_empty() || !tags.get(also).is_empty())
    })
}

/// Whether a node should be exported as an address.
#[must_use]
pub fn classify_node(node: &Node) -> bool {
    is_addressable(&node.tags)
}

/// Whether a way should be exported as an address.
#[must_use]
pub fn classify_way(way: &Way) -> bool {
    is_addressable(&way.tags)
}

/// Whether a way is a street taking part in crossroad detection.
#[must_use]
pub fn is_highway(way: &Way) -> bool {
    HIGHWAY_TYPES.contains(&way.tags.get("highway"))
}

/// Whether a `place=*` value denotes a settlement area.
#[must_use]
pub fn is_area_place(value: &str) -> bool {
    PlaceKind::parse(value).is_some_and(PlaceKind::is_area)
}

/// Whether a `place=*` value denotes a district inside a settlement.
#[must_use]
pub fn is_district_place(value: &str) -> bool {
    PlaceKind::parse(value).is_some_and(PlaceKind::is_district)
}

/// Name used for a street in the crossroad inverted index.
///
/// `addr:street` wins over `name`.
#[must_use]
pub fn preferred_way_name(tags: &Tags) -> Option<&str> {
    tags.non_empty("addr:street").or_else(|| tags.non_empty("name"))
}

/// Human-facing name of a street, `name` first and `addr:street` second.
#[must_use]
pub fn display_way_name(tags: &Tags) -> Option<&str> {
    tags.non_empty("name").or_else(|| tags.non_empty("addr:street"))
}

/// Recognized `place=*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlaceKind {
    /// `place=city`
    City,
    /// `place=town`
    Town,
    /// `place=village`
    Village,
    /// `place=hamlet`
    Hamlet,
    /// `place=neighbourhood`
    Neighbourhood,
    /// `place=suburb`
    Suburb,
}

impl PlaceKind {
    /// Parses a `place=*` tag value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "city" => Some(Self::City),
            "town" => Some(Self::Town),
            "village" => Some(Self::Village),
            "hamlet" => Some(Self::Hamlet),
            "neighbourhood" => Some(Self::Neighbourhood),
            "suburb" => Some(Self::Suburb),
            _ => None,
        }
    }

    /// The tag value this kind was parsed from.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Town => "town",
            Self::Village => "village",
            Self::Hamlet => "hamlet",
            Self::Neighbourhood => "neighbourhood",
            Self::Suburb => "suburb",
        }
    }

    /// Settlements: city, town, village, hamlet.
    #[must_use]
    pub const fn is_area(self) -> bool {
        matches!(self, Self::City | Self::Town | Self::Village | Self::Hamlet)
    }

    /// Districts: neighbourhood, suburb.
    #[must_use]
    pub const fn is_district(self) -> bool {
        matches!(self, Self::Neighbourhood | Self::Suburb)
    }
}
