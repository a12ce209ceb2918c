use crate::algorithms::common::FloatFormat;
use crate::config::{JobConfig, WorkerConfig};
use crate::error::PregelError;
use crate::graph::{GraphStore, StoreState, VertexEntry, STORE_BATCH_SIZE};
use crate::storage::memory::{MemoryDocumentStore, StoreOperation};
use crate::topology::StaticTopology;
use crate::util::thread_pool::ThreadPool;
use pregel_api::{Document, DocumentBuilder, GraphFormat, PregelId};
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Once;

/// Two vertex shards with vertices (a, b, c) and (d, e), co-partitioned with two edge shards
/// holding 4 and 1 edges.
fn two_shard_graph() -> (MemoryDocumentStore, StaticTopology) {
    let mut topology = StaticTopology::new();
    topology.add_collection("v", &["v1", "v2"]).add_collection("e", &["e1", "e2"]);
    let store = MemoryDocumentStore::new();
    for (shard, keys) in &[("v1", vec!["a", "b", "c"]), ("v2", vec!["d", "e"])] {
        for (i, key) in keys.iter().enumerate() {
            assert!(topology.place("v", key, shard));
            store
                .insert(shard, json!({"_key": key, "_id": format!("v/{}", key), "value": i}))
                .expect("Insert vertex");
        }
    }
    let edges = vec![
        ("e1", "a", "b", 1.0),
        ("e1", "a", "c", 2.0),
        ("e1", "b", "c", 3.0),
        ("e1", "c", "d", 4.0),
        ("e2", "d", "a", 5.0),
    ];
    for (i, (shard, from, to, weight)) in edges.into_iter().enumerate() {
        insert_edge(&store, shard, &i.to_string(), from, &format!("v/{}", to), weight);
    }
    (store, topology)
}

fn insert_edge(store: &MemoryDocumentStore, shard: &str, key: &str, from: &str, to: &str, w: f64) {
    store
        .insert(
            shard,
            json!({"_key": key, "_from": format!("v/{}", from), "_to": to, "weight": w}),
        )
        .expect("Insert edge");
}

fn worker_config(topology: &StaticTopology) -> WorkerConfig {
    let job = JobConfig {
        vertex_collections: vec!["v".to_owned()],
        edge_collections: vec!["e".to_owned()],
        parallelism: 2,
        load_batch_size: 2,
        ..JobConfig::default()
    };
    WorkerConfig::new(&job, topology).expect("Valid config")
}

fn value_format() -> Box<dyn GraphFormat<f64, f64>> {
    Box::new(FloatFormat::new(
        Some("value".to_owned()),
        "value".to_owned(),
        0.0,
        Some("weight".to_owned()),
        1.0,
    ))
}

fn new_store<'a>(
    store: &'a MemoryDocumentStore,
    topology: &'a StaticTopology,
    config: &'a WorkerConfig,
) -> GraphStore<'a, f64, f64> {
    GraphStore::new(store, topology, config, value_format(), ThreadPool::with_threads(2))
}

/// Keeps every warning logged by the tests of this binary.
struct WarningCapture {
    lines: Mutex<Vec<String>>,
}

impl Log for WarningCapture {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.lines.lock().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static WARNINGS: WarningCapture = WarningCapture { lines: parking_lot::const_mutex(Vec::new()) };
static CAPTURE: Once = Once::new();

fn capture_warnings() {
    CAPTURE.call_once(|| {
        log::set_logger(&WARNINGS).expect("No other logger in tests");
        log::set_max_level(LevelFilter::Warn);
    });
}

fn warnings_containing(text: &str) -> usize {
    WARNINGS.lines.lock().iter().filter(|line| line.contains(text)).count()
}

fn check_offsets<V, E>(graph: &GraphStore<V, E>)
where
    V: Default + Send + Sync,
    E: Default + Send + Sync,
{
    for entry in graph.vertex_iterator(..) {
        assert!(entry.edge_data_offset() + entry.edge_count() <= graph.edge_capacity());
        for edge in graph.edge_iterator(entry) {
            assert_eq!(edge.source_shard, entry.shard());
        }
    }
}

#[test]
fn load_co_partitioned_shards() {
    let (store, topology) = two_shard_graph();
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);
    let stats = graph.load_shards().expect("Load");

    assert_eq!(graph.state(), StoreState::Loaded);
    assert_eq!(stats.vertices, 5);
    assert_eq!(stats.shards_loaded, 2);
    assert_eq!(graph.local_vertex_count(), 5);
    assert!(graph.edge_capacity() <= 5);
    assert_eq!(graph.local_edge_count(), 5);
    check_offsets(&graph);

    let shard_v1 = config.shard_id("v1").expect("Shard id");
    let position = graph.position(&PregelId::new(shard_v1, "a".to_owned())).expect("Loaded");
    let entry = graph.vertex_entry(position).expect("Entry");
    let targets: Vec<_> = graph.edge_iterator(entry).map(|e| (e.to_key.as_str(), e.data)).collect();
    assert_eq!(targets, vec![("b", 1.0), ("c", 2.0)]);
    assert_eq!(graph.vertex_data(entry.vertex_data_offset()), Some(&0.0));

    let position = graph.position(&PregelId::new(shard_v1, "c".to_owned())).expect("Loaded");
    let entry = graph.vertex_entry(position).expect("Entry");
    let edge = graph.edge_iterator(entry).next().expect("Edge c -> d");
    let shard_v2 = config.shard_id("v2").expect("Shard id");
    assert_eq!(edge.target_id(), PregelId::new(shard_v2, "d".to_owned()));

    // Vertices of one shard stay contiguous and in scan order.
    let mut shards: Vec<_> = graph.vertex_iterator(..).map(VertexEntry::shard).collect();
    shards.dedup();
    assert_eq!(shards.len(), 2);
    let keys: Vec<_> = graph
        .vertex_iterator(..)
        .filter(|entry| entry.shard() == shard_v1)
        .map(VertexEntry::key)
        .collect();
    assert_eq!(keys, vec!["a", "b", "c"]);
    assert_eq!(graph.vertex_iterator(1..3).count(), 2);
    assert_eq!(graph.vertex_iterator(4..10).count(), 1);
    assert_eq!(graph.vertex_iterator(7..).count(), 0);
}

#[test]
fn dangling_edges_are_dropped() {
    capture_warnings();
    let (store, topology) = two_shard_graph();
    insert_edge(&store, "e2", "dangling", "e", "missing/x", 1.0);
    insert_edge(&store, "e2", "broken", "e", "no-slash", 1.0);
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);
    let stats = graph.load_shards().expect("Load");

    assert_eq!(stats.vertices, 5);
    assert_eq!(stats.dropped_edges, 2);
    assert_eq!(graph.dropped_edges(), 2);
    assert_eq!(graph.local_edge_count(), 5);
    assert!(graph.edge_capacity() < 7);
    check_offsets(&graph);
    assert_eq!(warnings_containing("cannot resolve target 'missing/x'"), 1);
    assert_eq!(warnings_containing("cannot resolve target 'no-slash'"), 1);
}

#[test]
fn second_load_skips_loaded_shards() {
    let (store, topology) = two_shard_graph();
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);
    graph.load_shards().expect("Load");
    let scans = store.operation_count(StoreOperation::Scan);

    let stats = graph.load_shards().expect("Second load");
    assert_eq!(stats.shards_loaded, 0);
    assert_eq!(stats.shards_skipped, 2);
    assert_eq!(graph.local_vertex_count(), 5);
    assert_eq!(store.operation_count(StoreOperation::Scan), scans);
}

#[test]
fn incremental_load_keeps_prior_offsets() {
    let (store, mut topology) = two_shard_graph();
    topology.place("v", "f", "v2");
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);
    graph.load_shards().expect("Load");
    let before: Vec<VertexEntry> = graph.vertex_iterator(..).cloned().collect();
    let vertex_end = graph.local_vertex_count();
    let edge_end = graph.edge_capacity();

    store.insert("v2", json!({"_key": "f", "value": 1.5})).expect("Insert");
    insert_edge(&store, "e2", "f1", "f", "v/a", 2.5);
    insert_edge(&store, "e2", "f2", "f", "other/a", 2.5);
    let position = graph.load_document("v/f").expect("Load document");

    assert_eq!(position, vertex_end);
    let entry = graph.vertex_entry(position).expect("Entry").clone();
    assert_eq!(entry.vertex_data_offset(), vertex_end);
    assert_eq!(entry.edge_data_offset(), edge_end);
    assert_eq!(entry.edge_count(), 1);
    assert_eq!(graph.vertex_data(entry.vertex_data_offset()), Some(&1.5));
    assert_eq!(graph.dropped_edges(), 1);
    assert_eq!(graph.vertex_iterator(..vertex_end).cloned().collect::<Vec<_>>(), before);
    check_offsets(&graph);

    // Loading it again is a no-op.
    assert_eq!(graph.load_document("v/f").expect("Load document"), position);
    assert_eq!(graph.local_vertex_count(), vertex_end + 1);

    assert!(matches!(graph.load_document("v/nothere"), Err(PregelError::DocumentNotFound(_))));
    assert!(matches!(graph.load_document("nothere"), Err(PregelError::InvalidDocumentId(_))));
    assert!(matches!(graph.load_document("e/0"), Err(PregelError::InvalidDocumentId(_))));
}

#[test]
fn failed_scan_fails_the_load() {
    let (store, topology) = two_shard_graph();
    store.fail_on(StoreOperation::Scan, "v2");
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);

    assert!(matches!(graph.load_shards(), Err(PregelError::Storage(_))));
    assert_eq!(graph.state(), StoreState::Failed);
    assert_eq!(graph.vertex_iterator(..).count(), 0);
    assert!(matches!(graph.load_shards(), Err(PregelError::InvalidState(..))));
}

#[test]
fn failed_count_fails_the_load() {
    let (store, topology) = two_shard_graph();
    store.fail_on(StoreOperation::Count, "e1");
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);

    assert!(graph.load_shards().is_err());
    assert_eq!(store.operation_count(StoreOperation::Scan), 0);
    assert_eq!(graph.state(), StoreState::Failed);
}

#[test]
fn stored_results_round_trip() {
    let (store, topology) = two_shard_graph();
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);
    assert!(matches!(graph.store_results(), Err(PregelError::InvalidState(..))));
    graph.load_shards().expect("Load");

    let offsets: Vec<usize> =
        graph.vertex_iterator(..).map(VertexEntry::vertex_data_offset).collect();
    for (i, offset) in offsets.iter().enumerate() {
        *graph.mutable_vertex_data(*offset).expect("Value") = 10.0 + i as f64;
    }
    let previous = graph.replace_vertex_data(offsets[0], 0.25).expect("Replace");
    assert_eq!(previous, 10.0);
    let stats = graph.store_results().expect("Store");
    assert_eq!(stats.documents, 5);
    assert_eq!(stats.batches, 2);
    assert_eq!(graph.state(), StoreState::Flushed);

    let expected: Vec<(PregelId, f64)> = graph
        .vertex_iterator(..)
        .map(|entry| {
            (entry.pregel_id(), *graph.vertex_data(entry.vertex_data_offset()).expect("Value"))
        })
        .collect();
    let mut reloaded = new_store(&store, &topology, &config);
    reloaded.load_shards().expect("Reload");
    for (id, value) in expected {
        let position = reloaded.position(&id).expect("Reloaded vertex");
        let entry = reloaded.vertex_entry(position).expect("Entry");
        assert_eq!(reloaded.vertex_data(entry.vertex_data_offset()), Some(&value));
    }
}

#[test]
fn lazily_loaded_vertex_sees_stored_result() {
    let (store, mut topology) = two_shard_graph();
    topology.place("v", "f", "v2");
    let config = worker_config(&topology);
    let mut reader = new_store(&store, &topology, &config);
    reader.load_shards().expect("Load reader");

    let mut writer = new_store(&store, &topology, &config);
    writer.load_shards().expect("Load writer");
    store.insert("v2", json!({"_key": "f", "value": 1.5})).expect("Insert");
    let position = writer.load_document("v/f").expect("Load document");
    let offset = writer.vertex_entry(position).expect("Entry").vertex_data_offset();
    *writer.mutable_vertex_data(offset).expect("Value") = 9.5;
    assert_eq!(writer.store_results().expect("Store").documents, 6);

    let position = reader.load_document("v/f").expect("Load flushed document");
    let entry = reader.vertex_entry(position).expect("Entry");
    assert_eq!(reader.vertex_data(entry.vertex_data_offset()), Some(&9.5));
    assert_eq!(reader.local_vertex_count(), 6);
}

#[test]
fn full_shard_is_stored_in_several_batches() {
    let (store, topology) = sized_graph(&[STORE_BATCH_SIZE + 1, 0], &[vec![]]);
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);
    graph.load_shards().expect("Load");
    for offset in 0..graph.local_vertex_count() {
        *graph.mutable_vertex_data(offset).expect("Value") = offset as f64;
    }

    let stats = graph.store_results().expect("Store");
    assert_eq!(stats.documents, STORE_BATCH_SIZE + 1);
    assert_eq!(stats.batches, 2);
    assert_eq!(store.operation_count(StoreOperation::Update), 2);
    let shard = config.shard_id("v0").expect("Shard id");
    let last = format!("s0k{}", STORE_BATCH_SIZE);
    let position = graph.position(&PregelId::new(shard, last.clone())).expect("Loaded");
    let expected = graph.vertex_entry(position).expect("Entry").vertex_data_offset() as f64;
    assert_eq!(
        store.document("v0", &last).and_then(|d| d.get("value").and_then(|v| v.as_f64())),
        Some(expected)
    );
}

#[test]
fn failed_update_stores_nothing() {
    let (store, topology) = two_shard_graph();
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);
    graph.load_shards().expect("Load");
    for offset in 0..graph.local_vertex_count() {
        *graph.mutable_vertex_data(offset).expect("Value") = 42.0;
    }
    store.fail_on(StoreOperation::Update, "v2");

    assert!(graph.store_results().is_err());
    assert_eq!(graph.state(), StoreState::Failed);
    assert_eq!(store.document("v1", "a").and_then(|d| d.get("value").cloned()), Some(json!(0)));
}

#[test]
fn non_finite_values_are_not_written() {
    let (store, topology) = two_shard_graph();
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);
    graph.load_shards().expect("Load");
    for offset in 0..graph.local_vertex_count() {
        *graph.mutable_vertex_data(offset).expect("Value") = f64::INFINITY;
    }
    *graph.mutable_vertex_data(0).expect("Value") = 3.0;
    let stats = graph.store_results().expect("Store");
    assert_eq!(stats.documents, 1);
}

/// Keeps no vertex values and no edge payloads.
struct TopologyFormat;

impl GraphFormat<(), ()> for TopologyFormat {
    fn copy_vertex_data(&self, _document_id: &str, _document: &Document, _target: &mut ()) {}

    fn copy_edge_data(&self, _document: &Document, _target: &mut ()) {}

    fn build_vertex_document(&self, _builder: &mut DocumentBuilder, _value: &()) -> bool {
        true
    }
}

#[test]
fn topology_only_mode() {
    let (store, topology) = two_shard_graph();
    let config = worker_config(&topology);
    let mut graph: GraphStore<(), ()> = GraphStore::new(
        &store,
        &topology,
        &config,
        Box::new(TopologyFormat),
        ThreadPool::with_threads(3),
    );
    assert!(!graph.materializes_vertex_data());
    graph.load_shards().expect("Load");
    assert_eq!(graph.local_vertex_count(), 5);
    assert_eq!(graph.local_edge_count(), 5);
    assert!(graph.vertex_data(0).is_none());
    for partition in graph.partitions(2) {
        assert!(partition.vertex_data.is_empty());
    }
    assert_eq!(graph.store_results().expect("Store").documents, 0);
    assert_eq!(store.operation_count(StoreOperation::Update), 0);
}

#[test]
fn partitions_are_aligned() {
    let (store, topology) = two_shard_graph();
    let config = worker_config(&topology);
    let mut graph = new_store(&store, &topology, &config);
    graph.load_shards().expect("Load");
    let partitions = graph.partitions(2);
    let sizes: Vec<_> = partitions.iter().map(|p| p.entries.len()).collect();
    assert_eq!(sizes, vec![3, 2]);
    for partition in &partitions {
        assert_eq!(partition.entries.len(), partition.vertex_data.len());
        for (i, entry) in partition.entries.iter().enumerate() {
            assert_eq!(entry.vertex_data_offset(), partition.start + i);
        }
    }
    assert_eq!(graph.partitions(10).len(), 5);
}

fn sized_graph(
    shard_sizes: &[usize],
    edge_targets: &[Vec<usize>],
) -> (MemoryDocumentStore, StaticTopology) {
    let vertex_shards: Vec<String> = (0..shard_sizes.len()).map(|i| format!("v{}", i)).collect();
    let edge_shards: Vec<String> = (0..shard_sizes.len()).map(|i| format!("e{}", i)).collect();
    let mut topology = StaticTopology::new();
    let vertex_refs: Vec<&str> = vertex_shards.iter().map(String::as_str).collect();
    let edge_refs: Vec<&str> = edge_shards.iter().map(String::as_str).collect();
    topology.add_collection("v", &vertex_refs).add_collection("e", &edge_refs);
    let store = MemoryDocumentStore::new();
    let mut keys = Vec::new();
    for (shard, size) in shard_sizes.iter().enumerate() {
        store.create_shard(&vertex_shards[shard]);
        store.create_shard(&edge_shards[shard]);
        for i in 0..*size {
            let key = format!("s{}k{}", shard, i);
            topology.place("v", &key, &vertex_shards[shard]);
            store.insert(&vertex_shards[shard], json!({ "_key": key.clone() })).expect("Insert");
            keys.push((shard, key));
        }
    }
    let mut edge_key = 0;
    for ((shard, key), targets) in keys.iter().zip(edge_targets.iter().cycle()) {
        for target in targets {
            let to = format!("v/{}", keys[target % keys.len()].1);
            insert_edge(&store, &edge_shards[*shard], &edge_key.to_string(), key, &to, 1.0);
            edge_key += 1;
        }
    }
    (store, topology)
}

proptest! {
    #[test]
    fn mismatched_shard_counts_fail_before_io(
        vertex_shards in 1_usize..5,
        edge_shards in 1_usize..5,
    ) {
        prop_assume!(vertex_shards != edge_shards);
        let vertex_names: Vec<String> = (0..vertex_shards).map(|i| format!("v{}", i)).collect();
        let edge_names: Vec<String> = (0..edge_shards).map(|i| format!("e{}", i)).collect();
        let mut topology = StaticTopology::new();
        topology
            .add_collection("v", &vertex_names.iter().map(String::as_str).collect::<Vec<_>>())
            .add_collection("e", &edge_names.iter().map(String::as_str).collect::<Vec<_>>());
        let store = MemoryDocumentStore::new();
        let config = worker_config(&topology);
        let mut graph = new_store(&store, &topology, &config);

        let result = graph.load_shards();
        prop_assert!(matches!(result, Err(PregelError::ShardCountMismatch(..))));
        prop_assert_eq!(store.operation_count(StoreOperation::Count), 0);
        prop_assert_eq!(store.operation_count(StoreOperation::Scan), 0);
    }

    #[test]
    fn loaded_vertices_match_shard_counts(
        shard_sizes in prop::collection::vec(0_usize..6, 1..4),
        edge_targets in prop::collection::vec(prop::collection::vec(0_usize..20, 0..3), 1..5),
    ) {
        let (store, topology) = sized_graph(&shard_sizes, &edge_targets);
        let config = worker_config(&topology);
        let mut graph = new_store(&store, &topology, &config);
        let stats = graph.load_shards().expect("Load");

        prop_assert_eq!(graph.local_vertex_count(), shard_sizes.iter().sum::<usize>());
        prop_assert_eq!(stats.vertices, graph.local_vertex_count());
        prop_assert_eq!(stats.dropped_edges, 0);
        let mut edges = 0;
        for entry in graph.vertex_iterator(..) {
            prop_assert!(entry.edge_data_offset() + entry.edge_count() <= graph.edge_capacity());
            for edge in graph.edge_iterator(entry) {
                prop_assert_eq!(edge.source_shard, entry.shard());
            }
            edges += entry.edge_count();
        }
        prop_assert_eq!(edges, graph.local_edge_count());
    }
}
