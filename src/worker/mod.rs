//! Superstep coordinator.
//!
//! A `Worker` loads the local shards into a `GraphStore`, then runs supersteps until no vertex is
//! active and no message is in flight, or the superstep limit is reached. Each superstep computes
//! the vertex partitions on the thread pool and crosses a barrier where messages are combined and
//! delivered and aggregators are merged.

use crate::aggregator::AggregatorHandler;
use crate::config::{JobConfig, WorkerConfig};
use crate::error::PregelError;
use crate::graph::{edge_range, GraphPartition, GraphStore};
use crate::util::thread_pool::ThreadPool;
use crate::util::timer::PregelTimer;
use log::{debug, info, warn};
use pregel_api::{Algorithm, MessageCombiner, PregelId, Superstep, VertexComputation};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod context;
mod job;
pub mod messages;

use context::VertexContext;
pub use job::{ExecutionStatus, JobContext, JobResult};
use messages::MessageCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Loading,
    Running(Superstep),
    Converged,
    StepLimitReached,
    StoringResults,
    Done,
    Failed,
}

struct PartitionResult<'c, M> {
    messages: MessageCache<'c, M>,
    aggregators: AggregatorHandler,
    computed: usize,
    active: usize,
}

#[derive(Debug, Default)]
struct SuperstepStats {
    computed: usize,
    active: usize,
    messages_sent: usize,
    delivered: usize,
    dropped: usize,
}

/// Runs `algorithm` as described by `context` and reports the outcome. Never fails: errors end
/// up in the returned status.
pub fn execute_algorithm<A: Algorithm>(algorithm: &A, context: &JobContext) -> JobResult {
    if let Err(e) = context.job.validate() {
        return JobResult::failed(algorithm.name(), e.to_string());
    }
    let config = match WorkerConfig::new(&context.job, context.topology) {
        Ok(config) => config,
        Err(e) => {
            warn!("Could not configure {}: {}", algorithm.name(), e);
            return JobResult::failed(algorithm.name(), e.to_string());
        }
    };
    Worker::new(context, &config, algorithm).run()
}

pub struct Worker<'a, A: Algorithm> {
    job: &'a JobConfig,
    config: &'a WorkerConfig,
    graph: GraphStore<'a, A::Vertex, A::Edge>,
    computation: Box<dyn VertexComputation<A::Vertex, A::Edge, A::Message>>,
    combiner: Option<Box<dyn MessageCombiner<A::Message>>>,
    aggregators: AggregatorHandler,
    thread_pool: ThreadPool,
    cancelled: Arc<AtomicBool>,
    state: WorkerState,
    superstep: Superstep,
    inbox: Vec<Vec<A::Message>>,
    result: JobResult,
}

impl<'a, A: Algorithm> Worker<'a, A> {
    pub fn new(context: &'a JobContext<'_>, config: &'a WorkerConfig, algorithm: &A) -> Self {
        let thread_pool = ThreadPool::with_threads(context.job.parallelism);
        let graph = GraphStore::new(
            context.store,
            context.topology,
            config,
            algorithm.input_format(),
            thread_pool,
        );
        Self {
            job: &context.job,
            config,
            graph,
            computation: algorithm.create_computation(),
            combiner: algorithm.message_combiner(),
            aggregators: AggregatorHandler::new(algorithm.aggregators()),
            thread_pool,
            cancelled: context.cancel_handle(),
            state: WorkerState::Idle,
            superstep: 0,
            inbox: Vec::new(),
            result: JobResult::new(algorithm.name()),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn graph(&self) -> &GraphStore<'a, A::Vertex, A::Edge> {
        &self.graph
    }

    pub fn run(mut self) -> JobResult {
        let timer = PregelTimer::now();
        match self.execute() {
            Ok(status) => self.result.status = status,
            Err(e) => {
                warn!("Job {} failed in state {:?}: {}", self.result.algorithm, self.state, e);
                self.state = WorkerState::Failed;
                self.result.status = ExecutionStatus::Failed(e.to_string());
            }
        }
        self.result.supersteps = self.superstep;
        self.result.vertex_count = self.graph.local_vertex_count();
        self.result.edge_count = self.graph.local_edge_count();
        self.result.dropped_edges = self.graph.dropped_edges();
        self.result.aggregators = self.aggregators.values();
        info!(
            "Job {} finished with {:?} after {} supersteps in {}",
            self.result.algorithm,
            self.result.status,
            self.superstep,
            timer.elapsed().to_seconds_string()
        );
        self.result
    }

    fn check_cancelled(&self) -> Result<(), PregelError> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(PregelError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn execute(&mut self) -> Result<ExecutionStatus, PregelError> {
        self.state = WorkerState::Loading;
        let timer = PregelTimer::now();
        self.graph.load_shards()?;
        self.result.load_seconds = timer.elapsed().seconds();
        self.inbox.resize_with(self.graph.local_vertex_count(), Vec::new);

        let timer = PregelTimer::now();
        let status = loop {
            self.check_cancelled()?;
            self.state = WorkerState::Running(self.superstep);
            let stats = self.run_superstep()?;
            info!(
                "Superstep {}: computed {} vertices, {} active, {} messages sent, {} delivered",
                self.superstep, stats.computed, stats.active, stats.messages_sent, stats.delivered
            );
            self.superstep += 1;
            self.result.messages_sent += stats.messages_sent;
            self.result.dropped_messages += stats.dropped;
            if stats.active == 0 && stats.delivered == 0 {
                self.state = WorkerState::Converged;
                break ExecutionStatus::Converged;
            }
            if self.superstep >= self.job.max_supersteps {
                self.state = WorkerState::StepLimitReached;
                break ExecutionStatus::StepLimitReached;
            }
        };
        self.result.compute_seconds = timer.elapsed().seconds();

        if self.job.store_results {
            self.check_cancelled()?;
            self.state = WorkerState::StoringResults;
            let timer = PregelTimer::now();
            let stats = self.graph.store_results()?;
            self.result.documents_written = stats.documents;
            self.result.store_seconds = timer.elapsed().seconds();
        }
        self.state = WorkerState::Done;
        Ok(status)
    }

    fn run_superstep(&mut self) -> Result<SuperstepStats, PregelError> {
        let superstep = self.superstep;
        let vertex_count = self.graph.local_vertex_count();
        let edge_count = self.graph.local_edge_count();
        let mut inbox = std::mem::take(&mut self.inbox);
        inbox.resize_with(vertex_count, Vec::new);

        let computation = self.computation.as_ref();
        let combiner = self.combiner.as_deref();
        let global = &self.aggregators;
        let thread_pool = self.thread_pool;
        let mut remaining: &[Vec<A::Message>] = &inbox;
        let mut tasks = Vec::new();
        for partition in self.graph.partitions(thread_pool.threads()) {
            let (messages, rest) = remaining.split_at(partition.entries.len());
            remaining = rest;
            tasks.push((partition, messages));
        }
        let results = thread_pool.run_tasks(tasks, |(partition, messages)| {
            compute_partition(
                partition,
                messages,
                computation,
                combiner,
                global,
                superstep,
                vertex_count,
                edge_count,
            )
        })?;
        // A single failed vertex fails the superstep; its partial aggregates are discarded.
        let results = results.into_iter().collect::<Result<Vec<_>, _>>()?;

        let mut stats = SuperstepStats::default();
        let mut merged = MessageCache::new(combiner);
        let mut partials = Vec::with_capacity(results.len());
        for result in results {
            stats.computed += result.computed;
            stats.active += result.active;
            merged.merge(result.messages);
            partials.push(result.aggregators);
        }
        stats.messages_sent = merged.sent_count();
        let messages: Vec<(PregelId, Vec<A::Message>)> = merged.into_messages().collect();
        drop(inbox);

        self.aggregators.advance(partials);
        let (delivered, dropped) = self.deliver(messages)?;
        stats.delivered = delivered;
        stats.dropped = dropped;
        Ok(stats)
    }

    /// Fills the inbox of the next superstep. Messages for vertices that are not in the store are
    /// dropped, unless lazy loading is enabled and the vertex lives in a local shard.
    fn deliver(
        &mut self,
        messages: Vec<(PregelId, Vec<A::Message>)>,
    ) -> Result<(usize, usize), PregelError> {
        let mut inbox = Vec::new();
        inbox.resize_with(self.graph.local_vertex_count(), Vec::new);
        let mut delivered = 0;
        let mut dropped = 0;
        for (target, messages) in messages {
            let position = match self.graph.position(&target) {
                Some(position) => Some(position),
                None if self.job.lazy_loading => self.load_on_demand(&target)?,
                None => None,
            };
            match position {
                Some(position) => {
                    if position >= inbox.len() {
                        inbox.resize_with(position + 1, Vec::new);
                    }
                    delivered += messages.len();
                    inbox[position].extend(messages);
                }
                None => {
                    debug!("Dropping {} messages for unknown vertex {}", messages.len(), target);
                    dropped += messages.len();
                }
            }
        }
        if dropped > 0 {
            warn!("Dropped {} messages for vertices not in the graph", dropped);
        }
        self.inbox = inbox;
        Ok((delivered, dropped))
    }

    fn load_on_demand(&mut self, target: &PregelId) -> Result<Option<usize>, PregelError> {
        if !self.config.is_local_vertex_shard(target.shard) {
            return Ok(None);
        }
        let collection = match self.config.collection_of(target.shard) {
            Some(collection) => collection,
            None => return Ok(None),
        };
        let document_id = format!("{}/{}", collection, target.key);
        match self.graph.load_document(&document_id) {
            Ok(position) => {
                debug!("Loaded vertex '{}' on demand", document_id);
                Ok(Some(position))
            }
            Err(PregelError::DocumentNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn compute_partition<'c, V, E, M>(
    partition: GraphPartition<'_, V, E>,
    inbox: &[Vec<M>],
    computation: &dyn VertexComputation<V, E, M>,
    combiner: Option<&'c dyn MessageCombiner<M>>,
    global: &AggregatorHandler,
    superstep: Superstep,
    vertex_count: usize,
    edge_count: usize,
) -> Result<PartitionResult<'c, M>, PregelError>
where
    V: Default,
    M: Clone,
{
    let GraphPartition { entries, vertex_data, edges, .. } = partition;
    let mut messages = MessageCache::new(combiner);
    let mut aggregators = global.fresh();
    let mut scratch = V::default();
    let mut computed = 0;
    let mut active = 0;
    for (i, entry) in entries.iter_mut().enumerate() {
        let incoming = &inbox[i];
        // Halted vertices are woken up by incoming messages only.
        if !entry.is_active() && incoming.is_empty() {
            continue;
        }
        let value = match vertex_data.get_mut(i) {
            Some(value) => value,
            None => {
                scratch = V::default();
                &mut scratch
            }
        };
        let mut context = VertexContext {
            id: entry.pregel_id(),
            value,
            edges: edge_range(edges, entry),
            messages: &mut messages,
            global_aggregators: global,
            partial_aggregators: &mut aggregators,
            superstep,
            vertex_count,
            edge_count,
            voted_halt: false,
        };
        computation.compute(&mut context, incoming.iter()).map_err(|e| {
            PregelError::Computation(format!(
                "Vertex {} failed in superstep {}: {}",
                context.id, superstep, e
            ))
        })?;
        let halted = context.voted_halt;
        entry.set_active(!halted);
        computed += 1;
        if !halted {
            active += 1;
        }
    }
    Ok(PartitionResult { messages, aggregators, computed, active })
}
