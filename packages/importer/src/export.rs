//! Per-task record building and bulk chunking.

use geoindex_hierarchy::Hierarchy;
use geoindex_importer_models::{Address, ExportTask};
use geoindex_osm::store::PrimitiveStore;
use geoindex_search::BulkBuffer;
use geoindex_xroads::Crossroad;

use crate::address::AddressResolver;

/// A document and the `_id` it is indexed under.
pub type Record = (String, Address);

/// Builds every record for one task, in store order.
#[must_use]
pub fn records(
    task: ExportTask,
    store: &PrimitiveStore,
    hierarchy: &Hierarchy,
    crossroads: &[Crossroad],
    default_country: &str,
) -> Vec<Record> {
    let resolver = AddressResolver::new(store, hierarchy, default_country);

    match task {
        ExportTask::Crossroads => crossroads
            .iter()
            .map(|crossroad| (crossroad.id.clone(), resolver.crossroad(crossroad)))
            .collect(),
        ExportTask::Nodes => store
            .filtered_nodes()
            .map(|node| (node.id.to_string(), resolver.node(node)))
            .collect(),
        ExportTask::Ways => store
            .filtered_ways()
            .filter_map(|way| Some((way.id.to_string(), resolver.way(way)?)))
            .collect(),
    }
}

/// Serializes records into bulk buffers of at most `batch_size` records.
///
/// A `batch_size` of zero is treated as one.
///
/// # Errors
///
/// Returns an error if a record cannot be serialized.
pub fn bulk_buffers(
    task: ExportTask,
    records: &[Record],
    batch_size: usize,
) -> Result<Vec<BulkBuffer>, serde_json::Error> {
    records
        .chunks(batch_size.max(1))
        .map(|chunk| {
            let mut buffer = BulkBuffer::new(task.as_str());
            for (id, address) in chunk {
                buffer.push(id, address)?;
            }
            Ok(buffer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use geo::Point;
    use geoindex_osm::store::store_from_primitives;
    use geoindex_osm_models::{Node, Primitive, Tags, Way};

    use super::*;

    fn fixture() -> PrimitiveStore {
        let mut primitives: Vec<Primitive> = (1..=5)
            .map(|id| {
                Primitive::Node(Node {
                    id,
                    lat: 1.0,
                    lon: f64::from(u8::try_from(id).unwrap()),
                    tags: [("addr:housenumber", id.to_string())].into_iter().collect(),
                })
            })
            .collect();
        primitives.push(Primitive::Node(Node {
            id: 6,
            lat: 0.0,
            lon: 0.0,
            tags: Tags::new(),
        }));
        primitives.push(Primitive::Way(Way {
            id: 20,
            tags: [("building", "yes"), ("name", "ЦУМ")].into_iter().collect(),
            node_refs: vec![1, 2],
        }));
        primitives.push(Primitive::Way(Way {
            id: 21,
            tags: [("building", "yes"), ("name", "Ghost")].into_iter().collect(),
            node_refs: vec![100],
        }));
        store_from_primitives(primitives)
    }

    #[test]
    fn node_records_cover_filtered_nodes() {
        let store = fixture();
        let hierarchy = Hierarchy::build(&store);

        let records = records(ExportTask::Nodes, &store, &hierarchy, &[], "KG");
        let ids: Vec<&str> = records.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn way_records_skip_unresolvable_ways() {
        let store = fixture();
        let hierarchy = Hierarchy::build(&store);

        let records = records(ExportTask::Ways, &store, &hierarchy, &[], "KG");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "20");
        assert_eq!(records[0].1.name, "ЦУМ");
    }

    #[test]
    fn crossroad_records_keep_detector_ids() {
        let store = fixture();
        let hierarchy = Hierarchy::build(&store);
        let crossroads = vec![Crossroad {
            id: "10_20_0".to_string(),
            point: Point::new(0.5, 0.5),
            names: vec!["A".to_string(), "B".to_string()],
        }];

        let records = records(ExportTask::Crossroads, &store, &hierarchy, &crossroads, "KG");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "10_20_0");
        assert!(records[0].1.intersection);
        assert_eq!(records[0].1.name, "A B");
    }

    #[test]
    fn buffers_are_chunked_by_batch_size() {
        let store = fixture();
        let hierarchy = Hierarchy::build(&store);
        let records = records(ExportTask::Nodes, &store, &hierarchy, &[], "KG");

        let buffers = bulk_buffers(ExportTask::Nodes, &records, 2).unwrap();
        let sizes: Vec<usize> = buffers.iter().map(BulkBuffer::records).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(buffers.iter().all(|buffer| buffer.source() == "nodes"));

        let first = std::str::from_utf8(buffers[0].body()).unwrap();
        let mut lines = first.lines();
        assert_eq!(lines.next(), Some(r#"{"index":{"_id":"1"}}"#));
        let document: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(document["housenumber"], "1");
        assert_eq!(document["country"], "KG");
    }

    #[test]
    fn zero_batch_size_means_one_record_per_buffer() {
        let store = fixture();
        let hierarchy = Hierarchy::build(&store);
        let records = records(ExportTask::Nodes, &store, &hierarchy, &[], "KG");

        assert_eq!(bulk_buffers(ExportTask::Nodes, &records, 0).unwrap().len(), 5);
        assert!(bulk_buffers(ExportTask::Nodes, &[], 10).unwrap().is_empty());
    }
}
