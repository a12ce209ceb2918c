//! Document store collaborator.
//!
//! The graph store only talks to storage through these traits: short-lived transactions over a
//! declared set of shards, shard scans in batches, key lookups, `_from` edge lookups and batched
//! updates.

use crate::error::PregelError;
use pregel_api::Document;
use std::time::Duration;

pub mod csv_import;
pub mod memory;

pub use memory::MemoryDocumentStore;

pub const KEY_ATTRIBUTE: &str = "_key";
pub const ID_ATTRIBUTE: &str = "_id";
pub const FROM_ATTRIBUTE: &str = "_from";
pub const TO_ATTRIBUTE: &str = "_to";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, new)]
pub struct TransactionOptions {
    pub lock_timeout: Duration,
    pub wait_for_sync: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self { lock_timeout: DEFAULT_LOCK_TIMEOUT, wait_for_sync: false }
    }
}

/// Outcome of a single entry of an `update_batch` call.
pub type OperationResult = Result<(), PregelError>;

pub trait DocumentStore: Send + Sync {
    fn begin_transaction(
        &self,
        read_shards: &[String],
        write_shards: &[String],
        options: TransactionOptions,
    ) -> Result<Box<dyn Transaction + '_>, PregelError>;
}

pub trait Transaction: Send {
    fn count(&self, shard: &str) -> Result<u64, PregelError>;

    fn scan<'a>(
        &'a self,
        shard: &str,
        batch_size: usize,
    ) -> Result<Box<dyn DocumentCursor + 'a>, PregelError>;

    fn read_document(&self, shard: &str, key: &str) -> Result<Option<Document>, PregelError>;

    /// All edges of `edge_shard` whose `_from` equals `from_id`.
    fn edges_from(&self, edge_shard: &str, from_id: &str) -> Result<Vec<Document>, PregelError>;

    /// Merges each patch into the document with the same `_key`.
    fn update_batch(
        &mut self,
        shard: &str,
        patches: Vec<Document>,
    ) -> Result<Vec<OperationResult>, PregelError>;

    fn commit(self: Box<Self>) -> Result<(), PregelError>;

    fn abort(self: Box<Self>) -> Result<(), PregelError>;
}

pub trait DocumentCursor {
    fn has_more(&self) -> bool;

    /// Appends up to `limit` documents to `out` and returns how many were appended.
    fn fetch_more(&mut self, limit: usize, out: &mut Vec<Document>) -> Result<usize, PregelError>;
}

/// The `_key` attribute of a document, if it is a non-empty string.
pub fn document_key(document: &Document) -> Option<&str> {
    document.get(KEY_ATTRIBUTE).and_then(Document::as_str).filter(|k| !k.is_empty())
}

pub fn string_attribute<'a>(document: &'a Document, attribute: &str) -> Option<&'a str> {
    document.get(attribute).and_then(Document::as_str)
}
