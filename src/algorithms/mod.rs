//! Built-in algorithms and the registry that selects one by name.

use crate::error::PregelError;
use crate::worker::{JobContext, JobResult};
use hashbrown::HashMap;
use itertools::Itertools;
use log::warn;

mod builder;
pub mod common;
pub mod pagerank;
pub mod sssp;
#[cfg(test)]
mod tests;

pub use builder::{initialize_algorithms, AlgorithmBuilder};

/// Looks up the job's algorithm in the registry and runs it on this worker.
pub fn run_job(context: &JobContext) -> JobResult {
    let mut algorithms = HashMap::new();
    initialize_algorithms(&mut algorithms);
    match algorithms.get(context.job.algorithm.as_str()) {
        Some(builder) => builder.run(context),
        None => {
            let error = PregelError::UnknownAlgorithm(context.job.algorithm.clone());
            warn!("{}. Available: {}", error, algorithms.keys().sorted().join(", "));
            JobResult::failed(&context.job.algorithm, error.to_string())
        }
    }
}
