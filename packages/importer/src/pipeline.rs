//! The import state machine.
//!
//! `Idle -> Parsing -> IndexRotating -> Exporting -> Done`, with `Failed`
//! reachable from every non-terminal state. Decode and rotation errors
//! stop the run immediately. During `Exporting` the crossroads, nodes and
//! ways tasks run concurrently; the first task to fail raises a shared
//! cancel flag. A sibling that has not issued its first bulk request yet
//! stops there, while one that is already submitting runs to completion.
//! Nothing that was written is rolled back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use geoindex_hierarchy::Hierarchy;
use geoindex_importer_models::{
    ExportTask, ImportConfig, ImportState, ImportSummary, IntersectionStrategy, TaskSummary,
};
use geoindex_osm::pbf::PrimitiveSource;
use geoindex_osm::progress::ProgressCallback;
use geoindex_osm::store::{PrimitiveStore, StoreBuilder};
use geoindex_search::SearchClient;
use geoindex_xroads::{Geometric, IntersectionDetector, NameCollision};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::ImportError;
use crate::export;

/// Knobs of a run that do not concern the source or the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Country for records outside every country polygon.
    pub default_country: String,
    /// Records per bulk request; zero is treated as one.
    pub bulk_batch_size: usize,
    /// Crossroad detector, see [`detector`].
    pub intersection_strategy: IntersectionStrategy,
    /// Delete older `<alias>-*` indices after `Done`.
    pub delete_stale_indices: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from(&ImportConfig::default())
    }
}

impl From<&ImportConfig> for ImportOptions {
    fn from(config: &ImportConfig) -> Self {
        Self {
            default_country: config.default_country.clone(),
            bulk_batch_size: config.bulk_batch_size,
            intersection_strategy: config.intersection_strategy,
            delete_stale_indices: config.delete_stale_indices,
        }
    }
}

/// The detector implementing `strategy`.
#[must_use]
pub fn detector(strategy: IntersectionStrategy) -> Box<dyn IntersectionDetector> {
    match strategy {
        IntersectionStrategy::NameCollision => Box::new(NameCollision),
        IntersectionStrategy::Geometric => Box::new(Geometric),
    }
}

/// One import run from an OSM source into a search engine.
pub struct Importer {
    source: Arc<dyn PrimitiveSource>,
    client: Arc<dyn SearchClient>,
    options: ImportOptions,
    progress: Arc<dyn ProgressCallback>,
    state: Arc<watch::Sender<ImportState>>,
    handle: Option<JoinHandle<Result<ImportSummary, ImportError>>>,
}

impl Importer {
    #[must_use]
    pub fn new(
        source: Arc<dyn PrimitiveSource>,
        client: Arc<dyn SearchClient>,
        options: ImportOptions,
        progress: Arc<dyn ProgressCallback>,
    ) -> Self {
        Self {
            source,
            client,
            options,
            progress,
            state: Arc::new(watch::Sender::new(ImportState::Idle)),
            handle: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ImportState {
        *self.state.borrow()
    }

    /// Receiver observing every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ImportState> {
        self.state.subscribe()
    }

    /// Launches the run in the background. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::AlreadyStarted`] if this importer has already
    /// been started.
    pub fn start(&mut self) -> Result<(), ImportError> {
        if self.handle.is_some() || self.state() != ImportState::Idle {
            return Err(ImportError::AlreadyStarted);
        }

        let run = Run {
            source: Arc::clone(&self.source),
            client: Arc::clone(&self.client),
            options: self.options.clone(),
            progress: Arc::clone(&self.progress),
            state: Arc::clone(&self.state),
        };
        self.handle = Some(tokio::spawn(run.execute()));

        Ok(())
    }

    /// Waits for the run to reach `Done` or `Failed`.
    ///
    /// # Errors
    ///
    /// Returns the error that moved the run to `Failed`, or
    /// [`ImportError::NotStarted`] if [`Self::start`] was never called.
    pub async fn wait_stop(&mut self) -> Result<ImportSummary, ImportError> {
        let handle = self.handle.take().ok_or(ImportError::NotStarted)?;

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                self.state.send_replace(ImportState::Failed);
                Err(ImportError::Join(e))
            }
        }
    }

    /// [`Self::start`] followed by [`Self::wait_stop`].
    ///
    /// # Errors
    ///
    /// See [`Self::wait_stop`].
    pub async fn run(&mut self) -> Result<ImportSummary, ImportError> {
        self.start()?;
        self.wait_stop().await
    }
}

/// Everything the background run owns.
struct Run {
    source: Arc<dyn PrimitiveSource>,
    client: Arc<dyn SearchClient>,
    options: ImportOptions,
    progress: Arc<dyn ProgressCallback>,
    state: Arc<watch::Sender<ImportState>>,
}

/// Read-only inputs shared by the export tasks.
struct ExportContext {
    store: PrimitiveStore,
    hierarchy: Hierarchy,
    detector: Box<dyn IntersectionDetector>,
    default_country: String,
    bulk_batch_size: usize,
}

impl Run {
    fn enter(&self, state: ImportState) {
        log::info!("Import state: {state}");
        self.state.send_replace(state);
    }

    async fn execute(self) -> Result<ImportSummary, ImportError> {
        let start = Instant::now();
        let result = self.stages().await;

        match &result {
            Ok(summary) => log::info!(
                "Import into {} complete: {} records in {:.1}s",
                summary.index,
                summary.total_records(),
                start.elapsed().as_secs_f64()
            ),
            Err(e) => {
                log::error!("Import failed in state {}: {e}", *self.state.borrow());
                self.enter(ImportState::Failed);
            }
        }

        result
    }

    async fn stages(&self) -> Result<ImportSummary, ImportError> {
        self.enter(ImportState::Parsing);
        let (context, primitives) = self.parse().await?;

        self.enter(ImportState::IndexRotating);
        let index = self.client.update_index().await?;
        log::info!("Writing into {index}");

        self.enter(ImportState::Exporting);
        let tasks = export_all(Arc::new(context), &self.client).await?;

        self.enter(ImportState::Done);

        let deleted_indices = if self.options.delete_stale_indices {
            match self.client.delete_stale_indices().await {
                Ok(deleted) => deleted,
                Err(e) => {
                    log::warn!("Failed to delete stale indices: {e}");
                    vec![]
                }
            }
        } else {
            vec![]
        };

        Ok(ImportSummary {
            index,
            primitives,
            tasks,
            deleted_indices,
        })
    }

    /// Runs the decode pass on the blocking pool and freezes the store.
    async fn parse(&self) -> Result<(ExportContext, u64), ImportError> {
        let source = Arc::clone(&self.source);
        let progress = Arc::clone(&self.progress);
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || -> Result<(ExportContext, u64), ImportError> {
            let builder = StoreBuilder::new();
            let primitives = source.parse(&builder, &progress)?;
            let store = builder.freeze();

            let stats = store.stats();
            log::info!(
                "Ingested {} nodes, {} ways, {} relations ({} addressable nodes, {} addressable ways, {} named highways)",
                stats.nodes,
                stats.ways,
                stats.relations,
                store.filtered_node_count(),
                store.filtered_way_count(),
                store.way_names().len(),
            );

            let hierarchy = Hierarchy::build(&store);

            Ok((
                ExportContext {
                    store,
                    hierarchy,
                    detector: detector(options.intersection_strategy),
                    default_country: options.default_country,
                    bulk_batch_size: options.bulk_batch_size,
                },
                primitives,
            ))
        })
        .await?
    }
}

/// Runs the three export tasks and joins them all.
///
/// Returns the first non-cancellation error once every task has stopped.
async fn export_all(
    context: Arc<ExportContext>,
    client: &Arc<dyn SearchClient>,
) -> Result<BTreeMap<ExportTask, TaskSummary>, ImportError> {
    let cancel = Arc::new(AtomicBool::new(false));
    let mut tasks = JoinSet::new();

    for task in ExportTask::ALL {
        tasks.spawn(export_task(
            task,
            Arc::clone(&context),
            Arc::clone(client),
            Arc::clone(&cancel),
        ));
    }

    let mut summaries = BTreeMap::new();
    let mut first_error: Option<ImportError> = None;

    while let Some(joined) = tasks.join_next().await {
        let error = match joined {
            Ok(Ok((task, summary))) => {
                summaries.insert(task, summary);
                continue;
            }
            Ok(Err(e)) => e,
            Err(e) => ImportError::Join(e),
        };

        cancel.store(true, Ordering::SeqCst);
        if matches!(error, ImportError::Cancelled(_)) {
            log::warn!("{error}");
        } else if first_error.is_none() {
            first_error = Some(error);
        } else {
            log::error!("Additional export failure: {error}");
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(summaries),
    }
}

/// Builds one task's buffers and submits them in order.
///
/// The cancel flag is only checked before the first request; once a task
/// has started writing it submits every buffer.
async fn export_task(
    task: ExportTask,
    context: Arc<ExportContext>,
    client: Arc<dyn SearchClient>,
    cancel: Arc<AtomicBool>,
) -> Result<(ExportTask, TaskSummary), ImportError> {
    let buffers = tokio::task::spawn_blocking(move || {
        let crossroads = if task == ExportTask::Crossroads {
            log::info!("Detecting crossroads with {}", context.detector.name());
            context.detector.detect(&context.store)
        } else {
            vec![]
        };

        let records = export::records(
            task,
            &context.store,
            &context.hierarchy,
            &crossroads,
            &context.default_country,
        );
        log::info!("Built {} {task} records", records.len());

        export::bulk_buffers(task, &records, context.bulk_batch_size)
    })
    .await?
    .map_err(|source| ImportError::Serialize { task, source })?;

    if cancel.load(Ordering::SeqCst) {
        return Err(ImportError::Cancelled(task));
    }

    let mut summary = TaskSummary::default();

    for buffer in &buffers {
        if let Err(source) = client.bulk_write(buffer).await {
            cancel.store(true, Ordering::SeqCst);
            return Err(ImportError::Export { task, source });
        }

        summary.records += buffer.records();
        summary.batches += 1;
    }

    log::info!(
        "Exported {} {task} records in {} batch(es)",
        summary.records,
        summary.batches
    );

    Ok((task, summary))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use geoindex_osm::OsmError;
    use geoindex_osm::pbf::MemorySource;
    use geoindex_osm::progress::null_progress;
    use geoindex_osm::store::OsmHandler;
    use geoindex_osm_models::{Node, Primitive, Way};
    use geoindex_search::{BulkBuffer, SearchError};
    use tokio::sync::Notify;

    use super::*;

    /// Search engine double recording successful writes per source.
    #[derive(Default)]
    struct FakeClient {
        fail_source: Option<&'static str>,
        fail_rotation: bool,
        rotations: AtomicUsize,
        stale_deletions: AtomicUsize,
        records: Mutex<BTreeMap<String, usize>>,
        bodies: Mutex<Vec<(String, String)>>,
        wrote: Notify,
        write_delay: Option<Duration>,
    }

    impl FakeClient {
        fn failing(source: &'static str) -> Self {
            Self {
                fail_source: Some(source),
                ..Self::default()
            }
        }

        fn records(&self, source: &str) -> usize {
            self.records
                .lock()
                .unwrap()
                .get(source)
                .copied()
                .unwrap_or_default()
        }

        fn sources_written(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        fn body(&self, source: &str) -> String {
            self.bodies
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _)| s == source)
                .map(|(_, body)| body.as_str())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl SearchClient for FakeClient {
        async fn update_index(&self) -> Result<String, SearchError> {
            if self.fail_rotation {
                return Err(SearchError::NoUrls);
            }
            let n = self.rotations.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("addresses-{n}"))
        }

        async fn bulk_write(&self, buffer: &BulkBuffer) -> Result<(), SearchError> {
            if self.fail_source == Some(buffer.source()) {
                // Fail only once both sibling tasks have been written.
                loop {
                    let notified = self.wrote.notified();
                    if self.sources_written() >= 2 {
                        break;
                    }
                    notified.await;
                }
                return Err(SearchError::Bulk {
                    source_name: buffer.source().to_string(),
                    failed: buffer.records(),
                    reason: "rejected".to_string(),
                });
            }

            if let Some(delay) = self.write_delay {
                tokio::time::sleep(delay).await;
            }

            *self
                .records
                .lock()
                .unwrap()
                .entry(buffer.source().to_string())
                .or_default() += buffer.records();
            self.bodies.lock().unwrap().push((
                buffer.source().to_string(),
                String::from_utf8(buffer.body().to_vec()).unwrap(),
            ));
            self.wrote.notify_waiters();
            Ok(())
        }

        async fn delete_stale_indices(&self) -> Result<Vec<String>, SearchError> {
            self.stale_deletions.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["addresses-0".to_string()])
        }
    }

    struct BrokenSource;

    impl PrimitiveSource for BrokenSource {
        fn parse(
            &self,
            _handler: &dyn OsmHandler,
            _progress: &Arc<dyn ProgressCallback>,
        ) -> Result<u64, OsmError> {
            Err(OsmError::Parse {
                path: "broken.osm.pbf".to_string(),
                message: "truncated blob".to_string(),
            })
        }
    }

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

    /// One crossroad (node 1), one addressable node (4), one addressable
    /// way (30).
    fn fixture() -> Vec<Primitive> {
        vec![
            node(1, 42.87, 74.60, &[]),
            node(2, 42.88, 74.60, &[]),
            node(3, 42.87, 74.61, &[]),
            node(
                4,
                42.875,
                74.605,
                &[("addr:street", "улица Манаса"), ("addr:housenumber", "1")],
            ),
            way(10, &[("highway", "primary"), ("name", "Lenina")], &[1, 2]),
            way(
                20,
                &[("highway", "residential"), ("addr:street", "Sovetskaya")],
                &[1, 3],
            ),
            way(30, &[("building", "yes"), ("name", "ЦУМ")], &[2, 3]),
        ]
    }

    fn source() -> Arc<dyn PrimitiveSource> {
        Arc::new(MemorySource::new(fixture()))
    }

    /// [`source`] plus `extra` more addressable nodes.
    fn source_with_nodes(extra: i64) -> Arc<dyn PrimitiveSource> {
        let mut primitives = fixture();
        for id in 100..100 + extra {
            primitives.push(node(id, 42.9, 74.5, &[("addr:housenumber", "7")]));
        }
        Arc::new(MemorySource::new(primitives))
    }

    fn importer(source: Arc<dyn PrimitiveSource>, client: &Arc<FakeClient>) -> Importer {
        importer_with(source, client, ImportOptions::default())
    }

    fn importer_with(
        source: Arc<dyn PrimitiveSource>,
        client: &Arc<FakeClient>,
        options: ImportOptions,
    ) -> Importer {
        Importer::new(
            source,
            Arc::clone(client) as Arc<dyn SearchClient>,
            options,
            null_progress(),
        )
    }

    #[tokio::test]
    async fn full_import_writes_every_task() {
        let client = Arc::new(FakeClient::default());
        let mut importer = importer(source(), &client);

        let summary = importer.run().await.unwrap();

        assert_eq!(importer.state(), ImportState::Done);
        assert_eq!(summary.index, "addresses-1");
        assert_eq!(summary.primitives, 7);
        assert_eq!(summary.total_records(), 3);
        assert_eq!(
            summary.tasks.get(&ExportTask::Ways),
            Some(&TaskSummary {
                records: 1,
                batches: 1
            })
        );
        assert_eq!(summary.deleted_indices, vec!["addresses-0"]);
        assert_eq!(client.stale_deletions.load(Ordering::SeqCst), 1);

        let crossroads = client.body("crossroads");
        assert!(crossroads.starts_with(r#"{"index":{"_id":"1"}}"#));
        assert!(crossroads.contains(r#""name":"Lenina Sovetskaya""#));
        assert!(crossroads.contains(r#""intersection":true"#));

        let nodes = client.body("nodes");
        assert!(nodes.contains(r#""prefix":"улица""#));
        assert!(nodes.contains(r#""street":"Манаса""#));
    }

    #[tokio::test]
    async fn failing_ways_task_does_not_hide_sibling_writes() {
        let client = Arc::new(FakeClient::failing("ways"));
        let mut importer = importer(source(), &client);

        let err = importer.run().await.unwrap_err();

        assert!(matches!(
            err,
            ImportError::Export {
                task: ExportTask::Ways,
                ..
            }
        ));
        assert_eq!(importer.state(), ImportState::Failed);
        assert_eq!(client.records("crossroads"), 1);
        assert_eq!(client.records("nodes"), 1);
        assert_eq!(client.records("ways"), 0);
        assert_eq!(client.stale_deletions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn siblings_already_writing_submit_every_batch() {
        let client = Arc::new(FakeClient {
            fail_source: Some("ways"),
            write_delay: Some(Duration::from_millis(20)),
            ..FakeClient::default()
        });
        let options = ImportOptions {
            bulk_batch_size: 1,
            ..ImportOptions::default()
        };
        let mut importer = importer_with(source_with_nodes(10), &client, options);

        let err = importer.run().await.unwrap_err();

        assert!(matches!(
            err,
            ImportError::Export {
                task: ExportTask::Ways,
                ..
            }
        ));
        assert_eq!(client.records("crossroads"), 1);
        assert_eq!(client.records("nodes"), 11);
        assert_eq!(client.records("ways"), 0);
    }

    #[tokio::test]
    async fn decode_failure_stops_before_rotation() {
        let client = Arc::new(FakeClient::default());
        let mut importer = importer(Arc::new(BrokenSource), &client);

        let err = importer.run().await.unwrap_err();

        assert!(matches!(err, ImportError::Osm(OsmError::Parse { .. })));
        assert_eq!(importer.state(), ImportState::Failed);
        assert_eq!(client.rotations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rotation_failure_stops_before_export() {
        let client = Arc::new(FakeClient {
            fail_rotation: true,
            ..FakeClient::default()
        });
        let mut importer = importer(source(), &client);

        let err = importer.run().await.unwrap_err();

        assert!(matches!(err, ImportError::Search(SearchError::NoUrls)));
        assert_eq!(importer.state(), ImportState::Failed);
        assert_eq!(client.sources_written(), 0);
    }

    #[tokio::test]
    async fn states_are_observable_in_order() {
        let client = Arc::new(FakeClient::default());
        let mut importer = importer(source(), &client);
        let mut states = importer.subscribe();

        let observer = tokio::spawn(async move {
            let mut seen = vec![*states.borrow_and_update()];
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                seen.push(state);
                if state.is_terminal() {
                    break;
                }
            }
            seen
        });

        importer.run().await.unwrap();
        let seen = observer.await.unwrap();

        // The channel only keeps the latest value, so states may be
        // skipped but never reordered.
        let order = [
            ImportState::Idle,
            ImportState::Parsing,
            ImportState::IndexRotating,
            ImportState::Exporting,
            ImportState::Done,
        ];
        let positions: Vec<usize> = seen
            .iter()
            .map(|state| order.iter().position(|s| s == state).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(seen.last(), Some(&ImportState::Done));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let client = Arc::new(FakeClient::default());
        let mut importer = importer(source(), &client);

        importer.start().unwrap();
        assert!(matches!(importer.start(), Err(ImportError::AlreadyStarted)));
        importer.wait_stop().await.unwrap();
    }

    #[tokio::test]
    async fn wait_without_start_is_rejected() {
        let client = Arc::new(FakeClient::default());
        let mut importer = importer(source(), &client);

        assert!(matches!(
            importer.wait_stop().await,
            Err(ImportError::NotStarted)
        ));
        assert_eq!(importer.state(), ImportState::Idle);
    }

    #[tokio::test]
    async fn cancelled_task_submits_nothing() {
        let client = Arc::new(FakeClient::default());
        let store = geoindex_osm::store::store_from_primitives([
            node(4, 1.0, 1.0, &[("addr:housenumber", "1")]),
            node(5, 1.0, 2.0, &[("addr:housenumber", "2")]),
        ]);
        let hierarchy = Hierarchy::build(&store);
        let context = Arc::new(ExportContext {
            store,
            hierarchy,
            detector: detector(IntersectionStrategy::NameCollision),
            default_country: "KG".to_string(),
            bulk_batch_size: 1,
        });

        let result = export_task(
            ExportTask::Nodes,
            context,
            Arc::clone(&client) as Arc<dyn SearchClient>,
            Arc::new(AtomicBool::new(true)),
        )
        .await;

        assert!(matches!(
            result,
            Err(ImportError::Cancelled(ExportTask::Nodes))
        ));
        assert_eq!(client.sources_written(), 0);
    }

    #[test]
    fn strategy_selects_detector() {
        assert_eq!(
            detector(IntersectionStrategy::NameCollision).name(),
            "name_collision"
        );
        assert_eq!(detector(IntersectionStrategy::Geometric).name(), "geometric");
    }
}
