use crate::config::JobConfig;
use crate::storage::DocumentStore;
use crate::topology::ShardTopology;
use pregel_api::{AggregatorValue, Superstep};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything the surrounding system hands over to run one job on this worker.
#[derive(new)]
pub struct JobContext<'a> {
    pub job: JobConfig,
    pub store: &'a dyn DocumentStore,
    pub topology: &'a dyn ShardTopology,
    #[new(default)]
    cancelled: Arc<AtomicBool>,
}

impl<'a> JobContext<'a> {
    /// Setting the returned flag cancels the job at the next superstep boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExecutionStatus {
    Converged,
    StepLimitReached,
    Failed(String),
}

impl ExecutionStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, ExecutionStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub algorithm: String,
    pub status: ExecutionStatus,
    pub supersteps: Superstep,
    pub vertex_count: usize,
    pub edge_count: usize,
    pub dropped_edges: usize,
    pub messages_sent: usize,
    pub dropped_messages: usize,
    pub documents_written: usize,
    pub aggregators: BTreeMap<String, AggregatorValue>,
    pub load_seconds: f64,
    pub compute_seconds: f64,
    pub store_seconds: f64,
}

impl JobResult {
    pub fn new(algorithm: &str) -> Self {
        Self {
            algorithm: algorithm.to_owned(),
            status: ExecutionStatus::Converged,
            supersteps: 0,
            vertex_count: 0,
            edge_count: 0,
            dropped_edges: 0,
            messages_sent: 0,
            dropped_messages: 0,
            documents_written: 0,
            aggregators: BTreeMap::new(),
            load_seconds: 0.0,
            compute_seconds: 0.0,
            store_seconds: 0.0,
        }
    }

    pub fn failed(algorithm: &str, reason: String) -> Self {
        Self { status: ExecutionStatus::Failed(reason), ..Self::new(algorithm) }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}
