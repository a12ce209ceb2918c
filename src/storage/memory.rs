use crate::error::{storage_error, PregelError};
use crate::storage::{
    document_key, string_attribute, DocumentCursor, DocumentStore, OperationResult, Transaction,
    TransactionOptions, FROM_ATTRIBUTE,
};
use hashbrown::{HashMap, HashSet};
use log::debug;
use parking_lot::{Mutex, RwLock};
use pregel_api::Document;

/// Operations of the in-memory store, used for counters and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Count,
    Scan,
    Read,
    EdgeLookup,
    Update,
    Commit,
}

#[derive(Debug, Default)]
struct MemoryShard {
    documents: Vec<Document>,
    keys: HashMap<String, usize>,
    from_index: HashMap<String, Vec<usize>>,
}

/// Document store keeping every shard in memory. Updates are buffered per transaction and only
/// applied on commit.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    shards: RwLock<HashMap<String, MemoryShard>>,
    failures: Mutex<HashSet<(StoreOperation, String)>>,
    counters: Mutex<HashMap<StoreOperation, usize>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_shard(&self, shard: &str) {
        self.shards.write().entry(shard.to_owned()).or_insert_with(MemoryShard::default);
    }

    /// Inserts a document, creating the shard on first use. Documents with an `_from` attribute
    /// are added to the shard's edge index.
    pub fn insert(&self, shard: &str, document: Document) -> Result<(), PregelError> {
        let key = document_key(&document)
            .ok_or_else(|| storage_error(format!("Document without _key in shard '{}'", shard)))?
            .to_owned();
        let mut shards = self.shards.write();
        let memory_shard = shards.entry(shard.to_owned()).or_insert_with(MemoryShard::default);
        if memory_shard.keys.contains_key(&key) {
            return Err(storage_error(format!(
                "Duplicate key '{}' in shard '{}'",
                key, shard
            )));
        }
        let position = memory_shard.documents.len();
        if let Some(from) = string_attribute(&document, FROM_ATTRIBUTE) {
            memory_shard.from_index.entry(from.to_owned()).or_insert_with(Vec::new).push(position);
        }
        memory_shard.keys.insert(key, position);
        memory_shard.documents.push(document);
        Ok(())
    }

    pub fn document(&self, shard: &str, key: &str) -> Option<Document> {
        let shards = self.shards.read();
        let memory_shard = shards.get(shard)?;
        memory_shard.keys.get(key).map(|&position| memory_shard.documents[position].clone())
    }

    pub fn document_count(&self, shard: &str) -> usize {
        self.shards.read().get(shard).map_or(0, |s| s.documents.len())
    }

    /// Makes every subsequent `operation` on `shard` fail.
    pub fn fail_on(&self, operation: StoreOperation, shard: &str) {
        self.failures.lock().insert((operation, shard.to_owned()));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// How many times `operation` has been attempted.
    pub fn operation_count(&self, operation: StoreOperation) -> usize {
        self.counters.lock().get(&operation).copied().unwrap_or(0)
    }

    fn record(&self, operation: StoreOperation, shard: &str) -> Result<(), PregelError> {
        *self.counters.lock().entry(operation).or_insert(0) += 1;
        if self.failures.lock().contains(&(operation, shard.to_owned())) {
            return Err(storage_error(format!(
                "Injected {:?} failure on shard '{}'",
                operation, shard
            )));
        }
        Ok(())
    }

    fn with_shard<T>(
        &self,
        shard: &str,
        f: impl FnOnce(&MemoryShard) -> T,
    ) -> Result<T, PregelError> {
        let shards = self.shards.read();
        let memory_shard =
            shards.get(shard).ok_or_else(|| storage_error(format!("Unknown shard '{}'", shard)))?;
        Ok(f(memory_shard))
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn begin_transaction(
        &self,
        read_shards: &[String],
        write_shards: &[String],
        options: TransactionOptions,
    ) -> Result<Box<dyn Transaction + '_>, PregelError> {
        debug!(
            "Begin transaction reading {:?}, writing {:?}, lock timeout {:?}",
            read_shards, write_shards, options.lock_timeout
        );
        Ok(Box::new(MemoryTransaction {
            store: self,
            read_shards: read_shards.iter().cloned().collect(),
            write_shards: write_shards.iter().cloned().collect(),
            pending: Vec::new(),
        }))
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryDocumentStore,
    read_shards: HashSet<String>,
    write_shards: HashSet<String>,
    pending: Vec<(String, Document)>,
}

impl<'a> MemoryTransaction<'a> {
    fn check_readable(&self, shard: &str) -> Result<(), PregelError> {
        if self.read_shards.contains(shard) || self.write_shards.contains(shard) {
            Ok(())
        } else {
            Err(storage_error(format!("Shard '{}' is not part of the transaction", shard)))
        }
    }
}

impl<'a> Transaction for MemoryTransaction<'a> {
    fn count(&self, shard: &str) -> Result<u64, PregelError> {
        self.check_readable(shard)?;
        self.store.record(StoreOperation::Count, shard)?;
        self.store.with_shard(shard, |s| s.documents.len() as u64)
    }

    fn scan<'b>(
        &'b self,
        shard: &str,
        batch_size: usize,
    ) -> Result<Box<dyn DocumentCursor + 'b>, PregelError> {
        self.check_readable(shard)?;
        self.store.record(StoreOperation::Scan, shard)?;
        let snapshot = self.store.with_shard(shard, |s| s.documents.clone())?;
        Ok(Box::new(MemoryCursor { documents: snapshot.into_iter(), batch_size }))
    }

    fn read_document(&self, shard: &str, key: &str) -> Result<Option<Document>, PregelError> {
        self.check_readable(shard)?;
        self.store.record(StoreOperation::Read, shard)?;
        self.store.with_shard(shard, |s| s.keys.get(key).map(|&p| s.documents[p].clone()))
    }

    fn edges_from(&self, edge_shard: &str, from_id: &str) -> Result<Vec<Document>, PregelError> {
        self.check_readable(edge_shard)?;
        self.store.record(StoreOperation::EdgeLookup, edge_shard)?;
        self.store.with_shard(edge_shard, |s| {
            s.from_index.get(from_id).map_or_else(Vec::new, |positions| {
                positions.iter().map(|&p| s.documents[p].clone()).collect()
            })
        })
    }

    fn update_batch(
        &mut self,
        shard: &str,
        patches: Vec<Document>,
    ) -> Result<Vec<OperationResult>, PregelError> {
        if !self.write_shards.contains(shard) {
            return Err(storage_error(format!(
                "Shard '{}' is not writable in the transaction",
                shard
            )));
        }
        self.store.record(StoreOperation::Update, shard)?;
        let mut results = Vec::with_capacity(patches.len());
        for patch in patches {
            let exists = match document_key(&patch) {
                Some(key) => self.store.with_shard(shard, |s| s.keys.contains_key(key))?,
                None => false,
            };
            if exists {
                self.pending.push((shard.to_owned(), patch));
                results.push(Ok(()));
            } else {
                let key = document_key(&patch).unwrap_or_default();
                results.push(Err(PregelError::DocumentNotFound(format!("{}/{}", shard, key))));
            }
        }
        Ok(results)
    }

    fn commit(self: Box<Self>) -> Result<(), PregelError> {
        let MemoryTransaction { store, write_shards, pending, .. } = *self;
        for shard in &write_shards {
            store.record(StoreOperation::Commit, shard)?;
        }
        let mut shards = store.shards.write();
        for (shard, patch) in pending {
            let memory_shard = match shards.get_mut(&shard) {
                Some(memory_shard) => memory_shard,
                None => continue,
            };
            let position = match document_key(&patch).and_then(|k| memory_shard.keys.get(k)) {
                Some(&position) => position,
                None => continue,
            };
            if let (Some(target), Document::Object(fields)) =
                (memory_shard.documents[position].as_object_mut(), patch)
            {
                for (name, value) in fields {
                    target.insert(name, value);
                }
            }
        }
        Ok(())
    }

    fn abort(self: Box<Self>) -> Result<(), PregelError> {
        debug!("Aborting transaction with {} pending updates", self.pending.len());
        Ok(())
    }
}

struct MemoryCursor {
    documents: std::vec::IntoIter<Document>,
    batch_size: usize,
}

impl DocumentCursor for MemoryCursor {
    fn has_more(&self) -> bool {
        !self.documents.as_slice().is_empty()
    }

    fn fetch_more(&mut self, limit: usize, out: &mut Vec<Document>) -> Result<usize, PregelError> {
        let before = out.len();
        out.extend(self.documents.by_ref().take(std::cmp::min(limit, self.batch_size)));
        Ok(out.len() - before)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::memory::{MemoryDocumentStore, StoreOperation};
    use crate::storage::{DocumentStore, TransactionOptions};
    use serde_json::json;

    fn shards(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn scan_in_batches() {
        let store = MemoryDocumentStore::new();
        for i in 0..5 {
            store.insert("s1", json!({"_key": format!("k{}", i)})).expect("Insert");
        }
        let trx = store
            .begin_transaction(&shards(&["s1"]), &[], TransactionOptions::default())
            .expect("Begin");
        assert_eq!(trx.count("s1").expect("Count"), 5);
        let mut cursor = trx.scan("s1", 2).expect("Scan");
        let mut batches = Vec::new();
        let mut buffer = Vec::new();
        while cursor.has_more() {
            buffer.clear();
            batches.push(cursor.fetch_more(10, &mut buffer).expect("Fetch"));
        }
        assert_eq!(batches, vec![2, 2, 1]);
        assert!(trx.count("s2").is_err());
    }

    #[test]
    fn updates_apply_on_commit_only() {
        let store = MemoryDocumentStore::new();
        store.insert("s1", json!({"_key": "a", "value": 1})).expect("Insert");

        let mut trx = store
            .begin_transaction(&[], &shards(&["s1"]), TransactionOptions::default())
            .expect("Begin");
        let results = trx
            .update_batch("s1", vec![json!({"_key": "a", "value": 2}), json!({"_key": "x"})])
            .expect("Update");
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        trx.abort().expect("Abort");
        assert_eq!(store.document("s1", "a"), Some(json!({"_key": "a", "value": 1})));

        let mut trx = store
            .begin_transaction(&[], &shards(&["s1"]), TransactionOptions::default())
            .expect("Begin");
        trx.update_batch("s1", vec![json!({"_key": "a", "value": 3})]).expect("Update");
        trx.commit().expect("Commit");
        assert_eq!(store.document("s1", "a"), Some(json!({"_key": "a", "value": 3})));
    }

    #[test]
    fn edge_index_and_failures() {
        let store = MemoryDocumentStore::new();
        store.insert("e1", json!({"_key": "1", "_from": "v/a", "_to": "v/b"})).expect("Insert");
        store.insert("e1", json!({"_key": "2", "_from": "v/a", "_to": "v/c"})).expect("Insert");
        store.insert("e1", json!({"_key": "3", "_from": "v/b", "_to": "v/c"})).expect("Insert");
        assert!(store.insert("e1", json!({"_key": "3"})).is_err());

        let trx = store
            .begin_transaction(&shards(&["e1"]), &[], TransactionOptions::default())
            .expect("Begin");
        assert_eq!(trx.edges_from("e1", "v/a").expect("Lookup").len(), 2);
        assert!(trx.edges_from("e1", "v/z").expect("Lookup").is_empty());

        store.fail_on(StoreOperation::Count, "e1");
        assert!(trx.count("e1").is_err());
        assert_eq!(store.operation_count(StoreOperation::Count), 1);
        store.clear_failures();
        assert_eq!(trx.count("e1").expect("Count"), 3);
    }
}
