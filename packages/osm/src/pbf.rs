//! Primitive sources feeding an [`OsmHandler`].
//!
//! [`PbfSource`] decodes an OSM PBF extract with `osmpbf`'s parallel
//! reader (`par_map_reduce`); the handler callbacks therefore run on the
//! reader's worker threads. [`MemorySource`] replays a fixed list of
//! primitives and is used for fixtures and tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use geoindex_osm_models::{Member, MemberType, Node, Primitive, Relation, Way};

use crate::OsmError;
use crate::progress::ProgressCallback;
use crate::store::OsmHandler;

/// How many primitives pass between two progress updates.
const PROGRESS_STEP: u64 = 1_000_000;

/// Anything that can push decoded primitives into a handler.
pub trait PrimitiveSource: Send + Sync {
    /// Decodes every primitive and hands it to `handler`.
    ///
    /// Returns the number of primitives decoded. Returning means the pass
    /// is complete: no callback runs after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`OsmError`] if the input cannot be read or decoded.
    fn parse(
        &self,
        handler: &dyn OsmHandler,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<u64, OsmError>;
}

/// An OSM PBF file on disk.
#[derive(Debug, Clone)]
pub struct PbfSource {
    path: PathBuf,
}

impl PbfSource {
    /// Creates a source for the PBF file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the PBF file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_error(&self, e: &osmpbf::Error) -> OsmError {
        OsmError::Parse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }
}

impl PrimitiveSource for PbfSource {
    fn parse(
        &self,
        handler: &dyn OsmHandler,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<u64, OsmError> {
        use osmpbf::ElementReader;

        if !self.path.exists() {
            return Err(OsmError::FileNotFound(self.path.display().to_string()));
        }

        log::info!("Parsing OSM PBF: {}", self.path.display());
        progress.set_message(format!("Parsing {}", self.path.display()));

        let reader = ElementReader::from_path(&self.path).map_err(|e| self.parse_error(&e))?;
        let seen = AtomicU64::new(0);

        let total = reader
            .par_map_reduce(
                |element| {
                    read_element(handler, element);

                    let count = seen.fetch_add(1, Ordering::Relaxed) + 1;
                    if count.is_multiple_of(PROGRESS_STEP) {
                        progress.set_position(count);
                    }
                    1u64
                },
                || 0u64,
                |a, b| a + b,
            )
            .map_err(|e| self.parse_error(&e))?;

        progress.finish(format!("Parsed {total} primitives"));
        log::info!("Parsed {total} primitives from {}", self.path.display());

        Ok(total)
    }
}

/// Hands one decoded element to `handler`.
fn read_element(handler: &dyn OsmHandler, element: osmpbf::Element<'_>) {
    use osmpbf::Element;

    match element {
        Element::Node(node) => {
            handler.read_node(to_node(node.id(), node.lat(), node.lon(), node.tags()));
        }
        Element::DenseNode(node) => {
            handler.read_node(to_node(node.id(), node.lat(), node.lon(), node.tags()));
        }
        Element::Way(way) => handler.read_way(to_way(way.id(), way.tags(), way.refs())),
        Element::Relation(relation) => handler.read_relation(Relation {
            id: relation.id(),
            tags: relation.tags().collect(),
            members: relation
                .members()
                .map(|member| {
                    let role = member.role().ok();
                    to_member(member.member_id, member.member_type, role)
                })
                .collect(),
        }),
    }
}

fn to_node<'a>(
    id: i64,
    lat: f64,
    lon: f64,
    tags: impl Iterator<Item = (&'a str, &'a str)>,
) -> Node {
    Node {
        id,
        lat,
        lon,
        tags: tags.collect(),
    }
}

fn to_way<'a>(
    id: i64,
    tags: impl Iterator<Item = (&'a str, &'a str)>,
    refs: impl Iterator<Item = i64>,
) -> Way {
    Way {
        id,
        tags: tags.collect(),
        node_refs: refs.collect(),
    }
}

/// An unreadable role becomes the empty role.
fn to_member(id: i64, member_type: osmpbf::RelMemberType, role: Option<&str>) -> Member {
    Member {
        id,
        member_type: match member_type {
            osmpbf::RelMemberType::Node => MemberType::Node,
            osmpbf::RelMemberType::Way => MemberType::Way,
            osmpbf::RelMemberType::Relation => MemberType::Relation,
        },
        role: role.unwrap_or_default().to_string(),
    }
}

/// A fixed, in-memory list of primitives.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    primitives: Vec<Primitive>,
}

impl MemorySource {
    /// Creates a source replaying `primitives` in order.
    #[must_use]
    pub fn new(primitives: Vec<Primitive>) -> Self {
        Self { primitives }
    }
}

impl PrimitiveSource for MemorySource {
    fn parse(
        &self,
        handler: &dyn OsmHandler,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<u64, OsmError> {
        progress.set_total(self.primitives.len() as u64);
        for primitive in &self.primitives {
            handler.read_primitive(primitive.clone());
            progress.inc(1);
        }
        Ok(self.primitives.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use geoindex_osm_models::Tags;

    use crate::progress::null_progress;
    use crate::store::StoreBuilder;

    use super::*;

    #[test]
    fn missing_file_is_reported() {
        let source = PbfSource::new("/definitely/not/here.osm.pbf");
        let builder = StoreBuilder::new();

        let err = source.parse(&builder, &null_progress()).unwrap_err();
        assert!(matches!(err, OsmError::FileNotFound(_)));
    }

    #[test]
    fn decoded_elements_reach_the_store() {
        let builder = StoreBuilder::new();

        builder.read_node(to_node(
            1,
            42.87,
            74.6,
            [("addr:housenumber", "12"), ("addr:street", "Chui")].into_iter(),
        ));
        builder.read_node(to_node(2, 42.88, 74.61, std::iter::empty()));
        builder.read_way(to_way(
            10,
            [("highway", "primary"), ("name", "Chui")].into_iter(),
            [1, 2].into_iter(),
        ));
        builder.read_relation(Relation {
            id: 100,
            tags: [("admin_level", "2"), ("name", "Kyrgyzstan")]
                .into_iter()
                .collect(),
            members: vec![
                to_member(10, osmpbf::RelMemberType::Way, Some("outer")),
                to_member(1, osmpbf::RelMemberType::Node, Some("label")),
                to_member(200, osmpbf::RelMemberType::Relation, None),
            ],
        });

        let store = builder.freeze();

        assert_eq!(store.node_count(), 2);
        assert_eq!(store.filtered_node_count(), 1);
        assert_eq!(store.node(1).unwrap().tags.get("addr:street"), "Chui");
        assert_eq!(store.way(10).unwrap().node_refs, vec![1, 2]);
        assert_eq!(store.way_name(10), Some("Chui"));

        let country = &store.countries()[&100];
        let members: Vec<(MemberType, &str)> = country
            .members
            .iter()
            .map(|member| (member.member_type, member.role.as_str()))
            .collect();
        assert_eq!(
            members,
            vec![
                (MemberType::Way, "outer"),
                (MemberType::Node, "label"),
                (MemberType::Relation, ""),
            ]
        );
    }

    #[test]
    fn memory_source_feeds_every_primitive() {
        let source = MemorySource::new(vec![
            Primitive::Node(Node {
                id: 1,
                lat: 1.0,
                lon: 2.0,
                tags: Tags::new(),
            }),
            Primitive::Way(Way {
                id: 2,
                tags: Tags::new(),
                node_refs: vec![1],
            }),
        ]);
        let builder = StoreBuilder::new();

        let count = source.parse(&builder, &null_progress()).unwrap();
        let store = builder.freeze();

        assert_eq!(count, 2);
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.way_count(), 1);
    }
}
