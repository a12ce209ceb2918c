use crate::error::{storage_error, PregelError};
use crate::graph::{GraphStore, StoreState};
use crate::storage::{Transaction, TransactionOptions, KEY_ATTRIBUTE};
use crate::util::timer::PregelTimer;
use log::{debug, info, warn};
use pregel_api::{Document, DocumentBuilder, ShardId};

/// Maximum number of vertex updates sent in one `update_batch` call.
pub const STORE_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlushStats {
    pub documents: usize,
    pub batches: usize,
    pub seconds: f64,
}

impl<'a, V, E> GraphStore<'a, V, E>
where
    V: Default + Send + Sync,
    E: Default + Send + Sync,
{
    /// Writes every vertex value back to its document in one write transaction over all local
    /// shards. Updates are sent per shard in batches; any failed update aborts the transaction,
    /// so either all results of the job are written or none.
    pub fn store_results(&mut self) -> Result<FlushStats, PregelError> {
        self.check_state("store results", &[StoreState::Loaded])?;
        let timer = PregelTimer::now();
        if !self.materializes_vertex_data() {
            info!("Graph has no vertex values. Nothing to store");
            self.state = StoreState::Flushed;
            return Ok(FlushStats::default());
        }

        let write_shards = self.config.all_local_shards();
        let options = TransactionOptions::new(self.config.lock_timeout(), true);
        let mut trx = self.store.begin_transaction(&[], &write_shards, options)?;
        match self.write_batches(trx.as_mut()) {
            Ok(mut stats) => {
                if let Err(e) = trx.commit() {
                    self.state = StoreState::Failed;
                    return Err(e);
                }
                self.state = StoreState::Flushed;
                let elapsed = timer.elapsed();
                stats.seconds = elapsed.seconds();
                info!(
                    "Stored {} vertex results in {} batches in {}",
                    stats.documents,
                    stats.batches,
                    elapsed.to_seconds_string()
                );
                Ok(stats)
            }
            Err(e) => {
                warn!("Storing results failed, aborting: {}", e);
                if let Err(abort_error) = trx.abort() {
                    warn!("Could not abort transaction: {}", abort_error);
                }
                self.state = StoreState::Failed;
                Err(e)
            }
        }
    }

    fn write_batches(&self, trx: &mut dyn Transaction) -> Result<FlushStats, PregelError> {
        let mut stats = FlushStats::default();
        let mut batch = Vec::with_capacity(STORE_BATCH_SIZE);
        let mut batch_shard: Option<ShardId> = None;
        for entry in &self.index {
            if batch_shard != Some(entry.shard()) || batch.len() >= STORE_BATCH_SIZE {
                if let Some(shard) = batch_shard {
                    self.send_batch(trx, shard, &mut batch, &mut stats)?;
                }
                batch_shard = Some(entry.shard());
            }
            let value = match self.vertex_data.get(entry.vertex_data_offset()) {
                Some(value) => value,
                None => continue,
            };
            let mut builder = DocumentBuilder::new();
            if self.format.build_vertex_document(&mut builder, value) {
                builder.insert(KEY_ATTRIBUTE.to_owned(), Document::from(entry.key()));
                batch.push(Document::Object(builder));
            }
        }
        if let Some(shard) = batch_shard {
            self.send_batch(trx, shard, &mut batch, &mut stats)?;
        }
        Ok(stats)
    }

    fn send_batch(
        &self,
        trx: &mut dyn Transaction,
        shard: ShardId,
        batch: &mut Vec<Document>,
        stats: &mut FlushStats,
    ) -> Result<(), PregelError> {
        if batch.is_empty() {
            return Ok(());
        }
        let shard_name = self
            .config
            .shard_name(shard)
            .ok_or_else(|| storage_error(format!("Unknown shard id {}", shard)))?;
        let documents = batch.len();
        let results = trx.update_batch(shard_name, std::mem::take(batch))?;
        if let Some(e) = results.into_iter().find_map(Result::err) {
            return Err(storage_error(format!(
                "Update of shard '{}' failed: {}",
                shard_name, e
            )));
        }
        debug!("Stored batch of {} documents in shard '{}'", documents, shard_name);
        stats.documents += documents;
        stats.batches += 1;
        Ok(())
    }
}
