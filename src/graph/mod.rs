//! Worker-local, shard-aware graph store.
//!
//! Vertices, vertex values and edges live in three flat arrays. A `VertexEntry` only records
//! offsets into the other two, so the arrays can be filled in parallel by shard-load tasks that
//! each own a disjoint, pre-computed range.

use crate::config::WorkerConfig;
use crate::error::PregelError;
use crate::storage::DocumentStore;
use crate::topology::ShardTopology;
use crate::util::thread_pool::ThreadPool;
use hashbrown::{HashMap, HashSet};
use pregel_api::{Edge, GraphFormat, PregelId, ShardId, UNASSIGNED_SHARD};
use std::ops::{Bound, RangeBounds};

mod flush;
mod loader;
#[cfg(test)]
mod tests;

pub use flush::{FlushStats, STORE_BATCH_SIZE};
pub use loader::LoadStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Created,
    Loading,
    Loaded,
    Flushed,
    Failed,
}

impl std::fmt::Display for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Index entry of a loaded vertex.
#[derive(Debug, Clone, PartialEq, new)]
pub struct VertexEntry {
    shard: ShardId,
    key: String,
    vertex_data_offset: usize,
    edge_data_offset: usize,
    #[new(value = "0")]
    edge_count: usize,
    #[new(value = "true")]
    active: bool,
}

impl Default for VertexEntry {
    fn default() -> Self {
        Self {
            shard: UNASSIGNED_SHARD,
            key: String::new(),
            vertex_data_offset: 0,
            edge_data_offset: 0,
            edge_count: 0,
            active: false,
        }
    }
}

impl VertexEntry {
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn pregel_id(&self) -> PregelId {
        PregelId::new(self.shard, self.key.clone())
    }

    pub fn vertex_data_offset(&self) -> usize {
        self.vertex_data_offset
    }

    pub fn edge_data_offset(&self) -> usize {
        self.edge_data_offset
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

/// A contiguous slice of the store handed to one compute task.
///
/// `vertex_data` is aligned with `entries` and is empty in topology-only mode.
pub struct GraphPartition<'g, V, E> {
    pub start: usize,
    pub entries: &'g mut [VertexEntry],
    pub vertex_data: &'g mut [V],
    pub edges: &'g [Edge<E>],
}

pub struct GraphStore<'a, V, E> {
    store: &'a dyn DocumentStore,
    topology: &'a dyn ShardTopology,
    config: &'a WorkerConfig,
    format: Box<dyn GraphFormat<V, E>>,
    thread_pool: ThreadPool,
    state: StoreState,
    index: Vec<VertexEntry>,
    vertex_data: Vec<V>,
    edges: Vec<Edge<E>>,
    positions: HashMap<PregelId, usize>,
    loaded_shards: HashSet<ShardId>,
    local_vertex_count: usize,
    local_edge_count: usize,
    dropped_edges: usize,
}

impl<'a, V, E> GraphStore<'a, V, E>
where
    V: Default + Send + Sync,
    E: Default + Send + Sync,
{
    pub fn new(
        store: &'a dyn DocumentStore,
        topology: &'a dyn ShardTopology,
        config: &'a WorkerConfig,
        format: Box<dyn GraphFormat<V, E>>,
        thread_pool: ThreadPool,
    ) -> Self {
        Self {
            store,
            topology,
            config,
            format,
            thread_pool,
            state: StoreState::Created,
            index: Vec::new(),
            vertex_data: Vec::new(),
            edges: Vec::new(),
            positions: HashMap::new(),
            loaded_shards: HashSet::new(),
            local_vertex_count: 0,
            local_edge_count: 0,
            dropped_edges: 0,
        }
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    fn check_state(&self, operation: &'static str, allowed: &[StoreState]) -> Result<(), PregelError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PregelError::InvalidState(operation, self.state.to_string()))
        }
    }

    /// Vertex values are only allocated if the format reports a non-zero size.
    pub fn materializes_vertex_data(&self) -> bool {
        self.format.estimated_vertex_size() > 0
    }

    pub fn local_vertex_count(&self) -> usize {
        self.local_vertex_count
    }

    pub fn local_edge_count(&self) -> usize {
        self.local_edge_count
    }

    /// Edges dropped so far because their target could not be resolved.
    pub fn dropped_edges(&self) -> usize {
        self.dropped_edges
    }

    pub fn is_shard_loaded(&self, shard: ShardId) -> bool {
        self.loaded_shards.contains(&shard)
    }

    pub fn edge_capacity(&self) -> usize {
        self.edges.len()
    }

    pub fn position(&self, id: &PregelId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn vertex_entry(&self, position: usize) -> Option<&VertexEntry> {
        self.index.get(position)
    }

    /// Entries in `range`, clamped to the loaded vertices.
    pub fn vertex_iterator(&self, range: impl RangeBounds<usize>) -> std::slice::Iter<VertexEntry> {
        let len = self.index.len();
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&end) => end.saturating_add(1),
            Bound::Excluded(&end) => end,
            Bound::Unbounded => len,
        };
        let end = end.min(len);
        self.index[start.min(end)..end].iter()
    }

    pub fn edge_iterator(&self, entry: &VertexEntry) -> std::slice::Iter<Edge<E>> {
        self.edges_of(entry).iter()
    }

    pub fn edges_of(&self, entry: &VertexEntry) -> &[Edge<E>] {
        edge_range(&self.edges, entry)
    }

    pub fn vertex_data(&self, vertex_data_offset: usize) -> Option<&V> {
        self.vertex_data.get(vertex_data_offset)
    }

    pub fn mutable_vertex_data(&mut self, vertex_data_offset: usize) -> Option<&mut V> {
        self.vertex_data.get_mut(vertex_data_offset)
    }

    /// Overwrites a vertex value in place and returns the previous one.
    pub fn replace_vertex_data(
        &mut self,
        vertex_data_offset: usize,
        value: V,
    ) -> Result<V, PregelError> {
        let slot = self.vertex_data.get_mut(vertex_data_offset).ok_or_else(|| {
            PregelError::Generic(format!("No vertex value at offset {}", vertex_data_offset))
        })?;
        Ok(std::mem::replace(slot, value))
    }

    pub fn active_count(&self) -> usize {
        self.index.iter().filter(|entry| entry.active).count()
    }

    /// Splits the vertex range into at most `parts` partitions of near-equal size.
    pub fn partitions(&mut self, parts: usize) -> Vec<GraphPartition<'_, V, E>> {
        let len = self.index.len();
        let chunk_size = std::cmp::max(1, (len + parts.max(1) - 1) / parts.max(1));
        let materialized = !self.vertex_data.is_empty();
        let edges: &[Edge<E>] = &self.edges;
        let mut entries: &mut [VertexEntry] = &mut self.index;
        let mut vertex_data: &mut [V] = &mut self.vertex_data;
        let mut partitions = Vec::new();
        let mut start = 0;
        while !entries.is_empty() {
            let size = chunk_size.min(entries.len());
            let (entry_chunk, entry_rest) = std::mem::take(&mut entries).split_at_mut(size);
            entries = entry_rest;
            let data_chunk = if materialized {
                let (data_chunk, data_rest) = std::mem::take(&mut vertex_data).split_at_mut(size);
                vertex_data = data_rest;
                data_chunk
            } else {
                &mut []
            };
            partitions.push(GraphPartition {
                start,
                entries: entry_chunk,
                vertex_data: data_chunk,
                edges,
            });
            start += size;
        }
        partitions
    }

    pub(crate) fn register_loaded(&mut self, from: usize) {
        for (position, entry) in self.index.iter().enumerate().skip(from) {
            self.positions.insert(entry.pregel_id(), position);
        }
        self.local_vertex_count = self.index.len();
        self.local_edge_count = self.edges.len();
    }
}

pub(crate) fn edge_range<'e, E>(edges: &'e [Edge<E>], entry: &VertexEntry) -> &'e [Edge<E>] {
    let start = entry.edge_data_offset.min(edges.len());
    let end = (entry.edge_data_offset + entry.edge_count).min(edges.len());
    debug_assert!(entry.edge_data_offset + entry.edge_count <= edges.len());
    &edges[start..end]
}
