use crate::algorithms::pagerank::PageRank;
use crate::algorithms::run_job;
use crate::algorithms::sssp::Sssp;
use crate::config::JobConfig;
use crate::storage::csv_import::CsvImporter;
use crate::storage::memory::MemoryDocumentStore;
use crate::topology::StaticTopology;
use crate::worker::{execute_algorithm, ExecutionStatus, JobContext};
use serde_json::json;

const VERTICES: &str = "data/test_data/vertices.csv";
const EDGES: &str = "data/test_data/edges.csv";
const VERTEX_SHARDS: [&str; 2] = ["v1", "v2"];

fn imported_graph() -> (MemoryDocumentStore, StaticTopology) {
    let mut topology = StaticTopology::new();
    topology.add_collection("v", &VERTEX_SHARDS).add_collection("e", &["e1", "e2"]);
    let store = MemoryDocumentStore::new();
    for shard in VERTEX_SHARDS.iter().chain(["e1", "e2"].iter()) {
        store.create_shard(shard);
    }
    let importer = CsvImporter::new(&store, &topology);
    assert_eq!(importer.import_vertices("v", VERTICES).expect("Import vertices"), 6);
    assert_eq!(importer.import_edges("e", "v", EDGES).expect("Import edges"), 7);
    (store, topology)
}

fn job(algorithm: &str, params: serde_json::Value) -> JobConfig {
    let mut job = JobConfig::from_json(
        &json!({
            "algorithm": algorithm,
            "vertexCollections": ["v"],
            "edgeCollections": ["e"],
            "maxSupersteps": 200,
            "parallelism": 2,
        })
        .to_string(),
    )
    .expect("Valid job");
    if let serde_json::Value::Object(params) = params {
        job.params = params.into_iter().collect();
    }
    job
}

fn field_of(store: &MemoryDocumentStore, key: &str, field: &str) -> Option<f64> {
    VERTEX_SHARDS
        .iter()
        .find_map(|shard| store.document(shard, key))
        .and_then(|document| document.get(field).and_then(serde_json::Value::as_f64))
}

#[test]
fn pagerank_converges_to_a_distribution() {
    let (store, topology) = imported_graph();
    let context = JobContext::new(job("pagerank", json!({"threshold": 1e-8})), &store, &topology);
    let result = run_job(&context);

    assert_eq!(result.status, ExecutionStatus::Converged);
    assert_eq!(result.vertex_count, 6);
    assert_eq!(result.edge_count, 7);
    assert_eq!(result.documents_written, 6);
    let ranks: Vec<f64> = (1..=6)
        .map(|key| field_of(&store, &key.to_string(), "pagerank").expect("Rank written"))
        .collect();
    assert!((ranks.iter().sum::<f64>() - 1.0).abs() < 1e-6, "Ranks {:?}", ranks);
    // Vertex 6 has no incoming edges and keeps the teleport share only.
    assert!((ranks[5] - 0.15 / 6.0).abs() < 1e-9);
    assert!(ranks.iter().all(|rank| *rank >= ranks[5]));
    assert!(result.aggregators["convergence"].as_f64().expect("Float aggregator") < 1e-6);
}

#[test]
fn pagerank_alias_and_step_limit() {
    let (store, topology) = imported_graph();
    let mut job = job("pr", json!({"resultField": "rank"}));
    job.max_supersteps = 3;
    let context = JobContext::new(job, &store, &topology);
    let result = run_job(&context);

    assert_eq!(result.algorithm, "pagerank");
    assert_eq!(result.status, ExecutionStatus::StepLimitReached);
    assert_eq!(result.supersteps, 3);
    let total: f64 = (1..=6).filter_map(|key| field_of(&store, &key.to_string(), "rank")).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert_eq!(field_of(&store, "1", "pagerank"), None);
}

#[test]
fn pagerank_without_storing() {
    let (store, topology) = imported_graph();
    let mut job = job("pagerank", json!({}));
    job.store_results = false;
    let context = JobContext::new(job, &store, &topology);
    let result = execute_algorithm(&PageRank::new(1e-4, "pagerank"), &context);

    assert_eq!(result.status, ExecutionStatus::Converged);
    assert_eq!(result.documents_written, 0);
    assert_eq!(field_of(&store, "1", "pagerank"), None);
}

#[test]
fn sssp_weighted_distances() {
    let (store, topology) = imported_graph();
    let params = json!({"source": "v/1", "weightField": "weight"});
    let context = JobContext::new(job("sssp", params), &store, &topology);
    let result = run_job(&context);

    assert_eq!(result.status, ExecutionStatus::Converged);
    let distances: Vec<Option<f64>> =
        (1..=6).map(|key| field_of(&store, &key.to_string(), "distance")).collect();
    assert_eq!(distances, vec![Some(0.0), Some(1.0), Some(3.0), Some(4.0), Some(7.0), None]);
    assert_eq!(result.documents_written, 5);
}

#[test]
fn sssp_unit_weights() {
    let (store, topology) = imported_graph();
    let context = JobContext::new(job("sssp", json!({})), &store, &topology);
    let result = execute_algorithm(&Sssp::new("v/6"), &context);

    assert_eq!(result.status, ExecutionStatus::Converged);
    let distances: Vec<Option<f64>> =
        (1..=6).map(|key| field_of(&store, &key.to_string(), "distance")).collect();
    assert_eq!(
        distances,
        vec![Some(1.0), Some(2.0), Some(2.0), Some(3.0), Some(4.0), Some(0.0)]
    );
}

#[test]
fn invalid_parameters_fail_the_job() {
    let (store, topology) = imported_graph();
    let cases = vec![
        ("sssp", json!({}), "source"),
        ("sssp", json!({"source": "no-collection"}), "collection/key"),
        ("pagerank", json!({"threshold": "high"}), "threshold"),
        ("pagerank", json!({"threshold": -1.0}), "threshold"),
        ("hits", json!({}), "Unknown algorithm 'hits'"),
    ];
    for (algorithm, params, message) in cases {
        let context = JobContext::new(job(algorithm, params), &store, &topology);
        match run_job(&context).status {
            ExecutionStatus::Failed(reason) => {
                assert!(reason.contains(message), "'{}' should mention '{}'", reason, message)
            }
            other => panic!("Expected failure for {}, got {:?}", algorithm, other),
        }
    }
    assert_eq!(field_of(&store, "1", "distance"), None);
}
