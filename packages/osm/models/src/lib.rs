#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared OpenStreetMap primitive types.
//!
//! This crate contains only the decoded map primitives (nodes, ways,
//! relations) and their tag maps. It has no heavyweight dependencies (no
//! PBF decoding, no geometry), so every other crate in the workspace can
//! depend on it cheaply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key/value tags attached to a primitive.
///
/// Lookups through [`Tags::get`] treat a missing key and an empty value
/// the same way: both yield `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Creates an empty tag map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the value for `key`, or `""` when the key is absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or("", String::as_str)
    }

    /// Returns the value for `key` if it is present and non-empty.
    #[must_use]
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Sets a tag, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no tags at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A decoded OSM node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// OSM node ID.
    pub id: i64,
    /// Latitude (WGS84).
    pub lat: f64,
    /// Longitude (WGS84).
    pub lon: f64,
    /// Node tags.
    pub tags: Tags,
}

/// A decoded OSM way.
///
/// The way only references its nodes by ID; node coordinates live in the
/// primitive store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Way {
    /// OSM way ID.
    pub id: i64,
    /// Way tags.
    pub tags: Tags,
    /// Ordered node references forming the way's polyline.
    pub node_refs: Vec<i64>,
}

/// Kind of primitive a relation member points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberType {
    /// Member is a node.
    Node,
    /// Member is a way.
    Way,
    /// Member is another relation.
    Relation,
}

/// A single member of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Referenced primitive ID.
    pub id: i64,
    /// Referenced primitive kind.
    pub member_type: MemberType,
    /// Role of the member within the relation (e.g. `"outer"`).
    pub role: String,
}

/// A decoded OSM relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// OSM relation ID.
    pub id: i64,
    /// Relation tags.
    pub tags: Tags,
    /// Ordered relation members.
    pub members: Vec<Member>,
}

/// Any decoded primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// A node.
    Node(Node),
    /// A way.
    Way(Way),
    /// A relation.
    Relation(Relation),
}

impl Primitive {
    /// ID of the wrapped primitive.
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Node(n) => n.id,
            Self::Way(w) => w.id,
            Self::Relation(r) => r.id,
        }
    }
}

impl From<Node> for Primitive {
    fn from(value: Node) -> Self {
        Self::Node(value)
    }
}

impl From<Way> for Primitive {
    fn from(value: Way) -> Self {
        Self::Way(value)
    }
}

impl From<Relation> for Primitive {
    fn from(value: Relation) -> Self {
        Self::Relation(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_empty_tags_read_as_empty() {
        let tags: Tags = [("name", ""), ("highway", "primary")].into_iter().collect();

        assert_eq!(tags.get("missing"), "");
        assert_eq!(tags.get("name"), "");
        assert_eq!(tags.non_empty("name"), None);
        assert_eq!(tags.non_empty("highway"), Some("primary"));
    }

    #[test]
    fn primitive_reports_inner_id() {
        let way = Way {
            id: 42,
            tags: Tags::new(),
            node_refs: vec![1, 2],
        };
        assert_eq!(Primitive::from(way).id(), 42);
    }
}
