// Enable warnings for all clippy lints.
#![warn(
    clippy::correctness,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::pedantic,
    clippy::cargo,
    clippy::restriction
)]
// Selectively disable warnings for some lints.
#![allow(
    clippy::indexing_slicing, // Allow `vec[i]` indexing.
    clippy::module_name_repetitions,  // Allow name repetitions in module and type names.
    clippy::use_debug, // Debug formatting is useful.
    clippy::multiple_crate_versions, // Beyond our control.
    clippy::missing_docs_in_private_items, // Disabled.
    clippy::missing_inline_in_public_items, // Not considered for now.
    clippy::implicit_return, // Allow.
    clippy::use_self, // Too pedantic.
    clippy::shadow_same,
    clippy::result_expect_used,
    clippy::unknown_clippy_lints
)]
// Mark some lints as errors.
#![deny(clippy::print_stdout)]

use clap::{arg_enum, value_t, App, Arg, ArgMatches};
use log::{info, Level};
use shardpregel::algorithms::run_job;
use shardpregel::config::JobConfig;
use shardpregel::error::PregelError;
use shardpregel::storage::csv_import::CsvImporter;
use shardpregel::storage::memory::MemoryDocumentStore;
use shardpregel::topology::StaticTopology;
use shardpregel::util::logger::{init_logger_from_env, init_logger_with_level};
use shardpregel::worker::JobContext;

arg_enum! {
    #[derive(PartialEq, Debug)]
    pub enum LogLevel {
        Error,
        Warn,
        Info,
        Debug,
        Trace,
    }
}

/// Loads a vertex and an edge CSV file into an in-memory store with `--shards` co-partitioned
/// shards per collection and runs the job described by the job file on it.
fn main() -> Result<(), PregelError> {
    let matches = App::new("shardpregel")
        .arg(
            Arg::from_usage("-l, --loglevel=[LEVEL] 'Set the log level'")
                .possible_values(&LogLevel::variants())
                .case_insensitive(true),
        )
        .args_from_usage(
            "-s, --shards=[SHARDS] 'Number of shards per collection'
            <job_file> 'Job configuration in json'
            <vertex_file> 'Vertex csv file'
            <edge_file> 'Edge csv file'",
        )
        .get_matches();

    setup_logger(&matches)?;

    let job_file = matches.value_of("job_file").unwrap_or_default();
    let json = std::fs::read_to_string(job_file)
        .map_err(|e| PregelError::ReadFile(job_file.to_owned(), e.to_string()))?;
    let job = JobConfig::from_json(&json)?;
    let shard_count = value_t!(matches, "shards", usize).unwrap_or(1).max(1);

    let vertex_collection = &job.vertex_collections[0];
    let edge_collection = &job.edge_collections[0];
    let mut topology = StaticTopology::new();
    let vertex_shards = shard_names(vertex_collection, shard_count);
    let edge_shards = shard_names(edge_collection, shard_count);
    fn names(shards: &[String]) -> Vec<&str> {
        shards.iter().map(String::as_str).collect::<Vec<_>>()
    }
    topology
        .add_collection(vertex_collection, &names(&vertex_shards))
        .add_collection(edge_collection, &names(&edge_shards));

    let store = MemoryDocumentStore::new();
    for shard in vertex_shards.iter().chain(edge_shards.iter()) {
        store.create_shard(shard);
    }
    let importer = CsvImporter::new(&store, &topology);
    importer
        .import_vertices(vertex_collection, matches.value_of("vertex_file").unwrap_or_default())?;
    importer.import_edges(
        edge_collection,
        vertex_collection,
        matches.value_of("edge_file").unwrap_or_default(),
    )?;

    let context = JobContext::new(job, &store, &topology);
    let result = run_job(&context);
    info!("[Result] {}", result.to_json());
    if let shardpregel::worker::ExecutionStatus::Failed(reason) = result.status {
        return Err(PregelError::Generic(reason));
    }
    Ok(())
}

fn shard_names(collection: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}_s{}", collection, i)).collect()
}

fn setup_logger(matches: &ArgMatches) -> Result<(), PregelError> {
    let log_level = match value_t!(matches, "loglevel", LogLevel) {
        Ok(LogLevel::Error) => Level::Error,
        Ok(LogLevel::Warn) => Level::Warn,
        Ok(LogLevel::Info) => Level::Info,
        Ok(LogLevel::Debug) => Level::Debug,
        Ok(LogLevel::Trace) => Level::Trace,
        Err(_) => return init_logger_from_env(),
    };
    init_logger_with_level(log_level)
}
