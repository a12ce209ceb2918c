use crate::config::WorkerConfig;
use crate::error::{storage_error, PregelError};
use crate::graph::{GraphStore, StoreState, VertexEntry};
use crate::storage::{
    document_key, string_attribute, DocumentStore, Transaction, TransactionOptions, TO_ATTRIBUTE,
};
use crate::topology::ShardTopology;
use crate::util::memory_usage::print_memory_usage;
use crate::util::timer::PregelTimer;
use hashbrown::HashSet;
use log::{debug, info, warn};
use pregel_api::{split_document_id, Edge, GraphFormat, PregelId, ShardId};
use std::ops::Range;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadStats {
    pub vertices: usize,
    pub edges: usize,
    pub dropped_edges: usize,
    pub shards_loaded: usize,
    pub shards_skipped: usize,
    pub seconds: f64,
}

/// A vertex shard to load, with the edge shards co-partitioned with it and its slots in the
/// pre-sized arrays.
#[derive(Debug)]
struct ShardPlan {
    collection: String,
    shard: String,
    shard_id: ShardId,
    edge_shards: Vec<String>,
    vertices: Range<usize>,
    edges: Range<usize>,
}

struct ShardLoadTask<'s, V, E> {
    plan: &'s ShardPlan,
    index: &'s mut [VertexEntry],
    vertex_data: &'s mut [V],
    edges: &'s mut [Edge<E>],
}

#[derive(Debug, Default)]
struct ShardLoadResult {
    vertices: usize,
    edges: usize,
    dropped_edges: usize,
}

/// Everything a load task needs, borrowed from the store so tasks can run on other threads.
struct ShardLoader<'l, V, E> {
    store: &'l dyn DocumentStore,
    resolver: EdgeResolver<'l>,
    config: &'l WorkerConfig,
    format: &'l dyn GraphFormat<V, E>,
}

/// Maps the `_to` attribute of an edge document onto a shard id and key.
#[derive(Clone, Copy)]
struct EdgeResolver<'l> {
    topology: &'l dyn ShardTopology,
    config: &'l WorkerConfig,
}

impl<'l> EdgeResolver<'l> {
    fn resolve(&self, to: &str) -> Option<(ShardId, String)> {
        let (collection, key) = split_document_id(to)?;
        let plan_id = self.topology.collection_plan_id(collection)?;
        let shard = self.topology.resolve_shard(&plan_id, key)?;
        let shard_id = self.config.shard_id(&shard)?;
        Some((shard_id, key.to_owned()))
    }
}

impl<'a, V, E> GraphStore<'a, V, E>
where
    V: Default + Send + Sync,
    E: Default + Send + Sync,
{
    /// Loads every locally hosted vertex shard that is not loaded yet, together with the edges of
    /// its co-partitioned edge shards.
    ///
    /// All shards are counted first and the arrays are sized to the total, then one task per
    /// shard fills its own range. Any count or scan failure fails the whole load.
    pub fn load_shards(&mut self) -> Result<LoadStats, PregelError> {
        self.check_state("load shards", &[StoreState::Created, StoreState::Loaded])?;
        self.state = StoreState::Loading;
        match self.load_pending_shards() {
            Ok(stats) => {
                self.state = StoreState::Loaded;
                Ok(stats)
            }
            Err(e) => {
                warn!("Loading shards failed: {}", e);
                self.state = StoreState::Failed;
                Err(e)
            }
        }
    }

    fn load_pending_shards(&mut self) -> Result<LoadStats, PregelError> {
        self.config.check_co_partitioning()?;
        let timer = PregelTimer::now();
        let mut stats = LoadStats::default();

        let mut pending = Vec::new();
        for (collection, shards) in self.config.local_vertex_shards() {
            for (shard_index, shard) in shards.iter().enumerate() {
                let shard_id = self.config.shard_id(shard).ok_or_else(|| {
                    storage_error(format!("Shard '{}' has no shard id", shard))
                })?;
                if self.loaded_shards.contains(&shard_id) {
                    debug!("Shard '{}' is already loaded. Skipping", shard);
                    stats.shards_skipped += 1;
                    continue;
                }
                pending.push((collection.clone(), shard.clone(), shard_id, shard_index));
            }
        }
        if pending.is_empty() {
            info!("No new shards to load");
            return Ok(stats);
        }

        let plans = self.plan_shards(pending)?;
        let vertex_base = self.index.len();
        let edge_base = self.edges.len();
        let vertex_total = plans.last().map_or(vertex_base, |plan| plan.vertices.end);
        let edge_total = plans.last().map_or(edge_base, |plan| plan.edges.end);
        let materialized = self.materializes_vertex_data();
        self.index.resize_with(vertex_total, VertexEntry::default);
        if materialized {
            self.vertex_data.resize_with(vertex_total, V::default);
        }
        self.edges.resize_with(edge_total, Edge::default);
        debug!(
            "Pre-sized graph store to {} vertices and {} edges",
            vertex_total, edge_total
        );

        let loader = ShardLoader {
            store: self.store,
            resolver: EdgeResolver { topology: self.topology, config: self.config },
            config: self.config,
            format: self.format.as_ref(),
        };
        let mut tasks = Vec::with_capacity(plans.len());
        {
            let mut index: &mut [VertexEntry] = &mut self.index[vertex_base..];
            let mut vertex_data: &mut [V] =
                if materialized { &mut self.vertex_data[vertex_base..] } else { &mut [] };
            let mut edges: &mut [Edge<E>] = &mut self.edges[edge_base..];
            for plan in &plans {
                let vertex_count = plan.vertices.len();
                let (index_chunk, index_rest) =
                    std::mem::take(&mut index).split_at_mut(vertex_count);
                index = index_rest;
                let data_chunk = if materialized {
                    let (data_chunk, data_rest) =
                        std::mem::take(&mut vertex_data).split_at_mut(vertex_count);
                    vertex_data = data_rest;
                    data_chunk
                } else {
                    &mut []
                };
                let (edge_chunk, edge_rest) =
                    std::mem::take(&mut edges).split_at_mut(plan.edges.len());
                edges = edge_rest;
                tasks.push(ShardLoadTask {
                    plan,
                    index: index_chunk,
                    vertex_data: data_chunk,
                    edges: edge_chunk,
                });
            }
        }
        let results = self.thread_pool.run_tasks(tasks, |task| loader.load_shard(task));
        let results =
            results.and_then(|results| results.into_iter().collect::<Result<Vec<_>, _>>());
        let results = match results {
            Ok(results) => results,
            Err(e) => {
                self.index.truncate(vertex_base);
                self.vertex_data.truncate(vertex_base);
                self.edges.truncate(edge_base);
                return Err(e);
            }
        };

        self.finalize(&plans, &results, vertex_base, edge_base);
        for (plan, result) in plans.iter().zip(&results) {
            self.loaded_shards.insert(plan.shard_id);
            stats.vertices += result.vertices;
            stats.edges += result.edges;
            stats.dropped_edges += result.dropped_edges;
        }
        stats.shards_loaded = plans.len();
        self.dropped_edges += stats.dropped_edges;
        self.register_loaded(vertex_base);

        let elapsed = timer.elapsed();
        stats.seconds = elapsed.seconds();
        if stats.dropped_edges > 0 {
            warn!("Dropped {} edges with unresolvable targets", stats.dropped_edges);
        }
        info!(
            "Loaded {} shards with {} vertices and {} edges in {}",
            stats.shards_loaded,
            stats.vertices,
            stats.edges,
            elapsed.to_seconds_string()
        );
        print_memory_usage(format_args!("after loading {} shards", stats.shards_loaded));
        Ok(stats)
    }

    /// Counts every pending vertex shard and its edge shards in one transaction and lays the
    /// shards out one after another behind the current array ends.
    fn plan_shards(
        &self,
        pending: Vec<(String, String, ShardId, usize)>,
    ) -> Result<Vec<ShardPlan>, PregelError> {
        let mut read_shards = Vec::new();
        let mut seen = HashSet::new();
        let mut paired = Vec::with_capacity(pending.len());
        for (_, shard, _, shard_index) in &pending {
            let edge_shards = self.config.paired_edge_shards(*shard_index);
            for name in std::iter::once(shard).chain(edge_shards.iter()) {
                if seen.insert(name.clone()) {
                    read_shards.push(name.clone());
                }
            }
            paired.push(edge_shards);
        }

        let trx = self.store.begin_transaction(&read_shards, &[], self.read_options())?;
        let counts = read_shards
            .iter()
            .map(|shard| trx.count(shard).map(|count| (shard.clone(), count)))
            .collect::<Result<hashbrown::HashMap<_, _>, _>>();
        let counts = finish_read(trx, counts)?;
        let count_of = |shard: &String| counts.get(shard).map_or(0, |count| *count as usize);

        let mut vertex_offset = self.index.len();
        let mut edge_offset = self.edges.len();
        let mut plans = Vec::with_capacity(pending.len());
        for ((collection, shard, shard_id, _), edge_shards) in pending.into_iter().zip(paired) {
            let vertex_count = count_of(&shard);
            let edge_count: usize = edge_shards.iter().map(count_of).sum();
            debug!(
                "Shard '{}' has {} vertices and at most {} edges",
                shard, vertex_count, edge_count
            );
            plans.push(ShardPlan {
                collection,
                shard,
                shard_id,
                edge_shards,
                vertices: vertex_offset..vertex_offset + vertex_count,
                edges: edge_offset..edge_offset + edge_count,
            });
            vertex_offset += vertex_count;
            edge_offset += edge_count;
        }
        Ok(plans)
    }

    /// Closes the holes left by shards that produced fewer vertices or edges than counted,
    /// fixes the offsets of the moved entries and truncates the arrays.
    fn finalize(
        &mut self,
        plans: &[ShardPlan],
        results: &[ShardLoadResult],
        vertex_base: usize,
        edge_base: usize,
    ) {
        let materialized = !self.vertex_data.is_empty();
        let mut vertex_cursor = vertex_base;
        let mut edge_cursor = edge_base;
        for (plan, result) in plans.iter().zip(results) {
            let edge_shift = plan.edges.start - edge_cursor;
            compact(&mut self.edges, plan.edges.start, result.edges, edge_cursor);
            let vertex_shift = plan.vertices.start - vertex_cursor;
            compact(&mut self.index, plan.vertices.start, result.vertices, vertex_cursor);
            if materialized {
                compact(&mut self.vertex_data, plan.vertices.start, result.vertices, vertex_cursor);
            }
            for entry in &mut self.index[vertex_cursor..vertex_cursor + result.vertices] {
                entry.edge_data_offset -= edge_shift;
                entry.vertex_data_offset -= vertex_shift;
            }
            vertex_cursor += result.vertices;
            edge_cursor += result.edges;
        }
        self.index.truncate(vertex_cursor);
        if materialized {
            self.vertex_data.truncate(vertex_cursor);
        }
        self.edges.truncate(edge_cursor);
    }

    /// Loads a single vertex and its edges and appends it at the end of the arrays. Returns the
    /// position of the vertex; an already loaded vertex is not loaded again.
    pub fn load_document(&mut self, document_id: &str) -> Result<usize, PregelError> {
        self.check_state("load document", &[StoreState::Loaded])?;
        let (collection, key) = split_document_id(document_id)
            .filter(|(collection, _)| self.config.is_vertex_collection(collection))
            .ok_or_else(|| PregelError::InvalidDocumentId(document_id.to_owned()))?;
        let plan_id = self
            .topology
            .collection_plan_id(collection)
            .ok_or_else(|| PregelError::UnknownCollection(collection.to_owned()))?;
        let shard = self
            .topology
            .resolve_shard(&plan_id, key)
            .ok_or_else(|| storage_error(format!("No shard for document '{}'", document_id)))?;
        let shard_id = self
            .config
            .shard_id(&shard)
            .ok_or_else(|| storage_error(format!("Shard '{}' has no shard id", shard)))?;
        if let Some(position) = self.position(&PregelId::new(shard_id, key.to_owned())) {
            return Ok(position);
        }
        let shard_index = self
            .config
            .local_vertex_shards()
            .iter()
            .find_map(|(_, shards)| shards.iter().position(|s| *s == shard))
            .ok_or_else(|| {
                storage_error(format!("Shard '{}' of '{}' is not local", shard, document_id))
            })?;
        let edge_shards = self.config.paired_edge_shards(shard_index);
        let read_shards: Vec<String> =
            std::iter::once(shard.clone()).chain(edge_shards.iter().cloned()).collect();

        let trx = self.store.begin_transaction(&read_shards, &[], self.read_options())?;
        let loader = ShardLoader {
            store: self.store,
            resolver: EdgeResolver { topology: self.topology, config: self.config },
            config: self.config,
            format: self.format.as_ref(),
        };
        let position = self.index.len();
        let edge_offset = self.edges.len();
        let mut entry = VertexEntry::new(shard_id, key.to_owned(), position, edge_offset);
        let mut value = V::default();
        let mut new_edges = Vec::new();
        let loaded = trx.read_document(&shard, key).and_then(|document| {
            let document = document
                .ok_or_else(|| PregelError::DocumentNotFound(document_id.to_owned()))?;
            loader.format.copy_vertex_data(document_id, &document, &mut value);
            loader.read_edges(trx.as_ref(), shard_id, document_id, &edge_shards, |edge| {
                new_edges.push(edge);
                Ok(())
            })
        });
        let (edge_count, dropped) = finish_read(trx, loaded)?;

        entry.edge_count = edge_count;
        if self.materializes_vertex_data() {
            self.vertex_data.push(value);
        }
        self.edges.extend(new_edges);
        self.positions.insert(entry.pregel_id(), position);
        self.index.push(entry);
        self.dropped_edges += dropped;
        self.local_vertex_count = self.index.len();
        self.local_edge_count = self.edges.len();
        debug!("Loaded document '{}' with {} edges", document_id, edge_count);
        Ok(position)
    }

    fn read_options(&self) -> TransactionOptions {
        TransactionOptions::new(self.config.lock_timeout(), false)
    }
}

impl<'l, V, E> ShardLoader<'l, V, E>
where
    V: Default,
    E: Default,
{
    fn load_shard(&self, task: ShardLoadTask<V, E>) -> Result<ShardLoadResult, PregelError> {
        let timer = PregelTimer::now();
        let plan = task.plan;
        let read_shards: Vec<String> =
            std::iter::once(plan.shard.clone()).chain(plan.edge_shards.iter().cloned()).collect();
        let options = TransactionOptions::new(self.config.lock_timeout(), false);
        let trx = self.store.begin_transaction(&read_shards, &[], options)?;
        let result = self.scan_shard(trx.as_ref(), task);
        let result = finish_read(trx, result)?;
        info!(
            "Loaded shard '{}' with {} vertices and {} edges in {}",
            plan.shard,
            result.vertices,
            result.edges,
            timer.elapsed().to_seconds_string()
        );
        Ok(result)
    }

    fn scan_shard(
        &self,
        trx: &dyn Transaction,
        task: ShardLoadTask<V, E>,
    ) -> Result<ShardLoadResult, PregelError> {
        let ShardLoadTask { plan, index, vertex_data, edges } = task;
        let materialized = !vertex_data.is_empty();
        let mut result = ShardLoadResult::default();
        let mut cursor = trx.scan(&plan.shard, self.config.load_batch_size())?;
        let mut batch = Vec::with_capacity(self.config.load_batch_size());
        while cursor.has_more() {
            batch.clear();
            if cursor.fetch_more(self.config.load_batch_size(), &mut batch)? == 0 {
                break;
            }
            for document in &batch {
                let key = match document_key(document) {
                    Some(key) => key,
                    None => {
                        warn!("Skipping document without _key in shard '{}'", plan.shard);
                        continue;
                    }
                };
                if result.vertices >= index.len() {
                    return Err(storage_error(format!(
                        "Shard '{}' returned more documents than its count of {}",
                        plan.shard,
                        index.len()
                    )));
                }
                let document_id = format!("{}/{}", plan.collection, key);
                let slot = result.vertices;
                let mut entry = VertexEntry::new(
                    plan.shard_id,
                    key.to_owned(),
                    plan.vertices.start + slot,
                    plan.edges.start + result.edges,
                );
                if materialized {
                    self.format.copy_vertex_data(&document_id, document, &mut vertex_data[slot]);
                }

                let mut written = result.edges;
                let (edge_count, dropped) = self.read_edges(
                    trx,
                    plan.shard_id,
                    &document_id,
                    &plan.edge_shards,
                    |edge| match edges.get_mut(written) {
                        Some(target) => {
                            *target = edge;
                            written += 1;
                            Ok(())
                        }
                        None => Err(storage_error(format!(
                            "Edge shards of '{}' returned more edges than counted",
                            plan.shard
                        ))),
                    },
                )?;
                entry.edge_count = edge_count;
                index[slot] = entry;
                result.vertices += 1;
                result.edges += edge_count;
                result.dropped_edges += dropped;
            }
        }
        Ok(result)
    }

    /// Reads the outgoing edges of `document_id` from every edge shard, resolving their targets.
    /// Edges with an unresolvable target are dropped. Returns the kept and dropped counts.
    fn read_edges(
        &self,
        trx: &dyn Transaction,
        source_shard: ShardId,
        document_id: &str,
        edge_shards: &[String],
        mut emit: impl FnMut(Edge<E>) -> Result<(), PregelError>,
    ) -> Result<(usize, usize), PregelError> {
        let mut kept = 0;
        let mut dropped = 0;
        for edge_shard in edge_shards {
            for document in trx.edges_from(edge_shard, document_id)? {
                let to = string_attribute(&document, TO_ATTRIBUTE).unwrap_or("");
                let (target_shard, to_key) = match self.resolver.resolve(to) {
                    Some(target) => target,
                    None => {
                        warn!(
                            "Dropping edge of '{}' in shard '{}': cannot resolve target '{}'",
                            document_id, edge_shard, to
                        );
                        dropped += 1;
                        continue;
                    }
                };
                let mut edge = Edge::new(source_shard, target_shard, to_key, E::default());
                if self.format.stores_edge_data() {
                    self.format.copy_edge_data(&document, &mut edge.data);
                }
                emit(edge)?;
                kept += 1;
            }
        }
        Ok((kept, dropped))
    }
}

/// Commits a read-only transaction after success and aborts it otherwise.
fn finish_read<T>(
    trx: Box<dyn Transaction + '_>,
    result: Result<T, PregelError>,
) -> Result<T, PregelError> {
    match result {
        Ok(value) => {
            trx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(abort_error) = trx.abort() {
                warn!("Could not abort transaction: {}", abort_error);
            }
            Err(e)
        }
    }
}

/// Moves `items[from..from + len]` down to `to`. Requires `to <= from`.
pub(crate) fn compact<T>(items: &mut [T], from: usize, len: usize, to: usize) {
    debug_assert!(to <= from);
    if to == from {
        return;
    }
    for i in 0..len {
        items.swap(to + i, from + i);
    }
}

#[cfg(test)]
mod compact_tests {
    use crate::graph::loader::compact;

    #[test]
    fn compact_overlapping_ranges() {
        let mut items = vec![0, 1, -1, -1, 4, 5, 6, -1];
        compact(&mut items, 4, 3, 2);
        assert_eq!(&items[..5], &[0, 1, 4, 5, 6]);

        let mut items = vec![-1, 1, 2, 3];
        compact(&mut items, 1, 3, 0);
        assert_eq!(&items[..3], &[1, 2, 3]);
    }
}
