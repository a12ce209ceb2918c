mod aggregation;
mod computation;
mod graph_format;

// Public exports from root of the crate.
pub use aggregation::*;
pub use computation::*;
pub use graph_format::*;

use derive_new::new;
use serde_derive::{Deserialize, Serialize};

// Universally used types.
pub type ShardId = u16;
pub type Superstep = u64;

/// Raw document as handed out by the document store.
pub type Document = serde_json::Value;
/// Builder used to assemble an update document for a single vertex.
pub type DocumentBuilder = serde_json::Map<String, Document>;

/// Marker for a shard that could not be resolved.
pub const UNASSIGNED_SHARD: ShardId = ShardId::MAX;

/// Globally unique identity of a vertex: the shard that owns it and its document key.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, new,
)]
pub struct PregelId {
    pub shard: ShardId,
    pub key: String,
}

impl PregelId {
    pub fn is_valid(&self) -> bool {
        self.shard != UNASSIGNED_SHARD && !self.key.is_empty()
    }
}

impl std::fmt::Display for PregelId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{}:{}", self.shard, self.key)
    }
}

/// An outgoing edge of a loaded vertex.
///
/// `source_shard` is the shard of the tail vertex, `target_shard` and `to_key` identify the head
/// vertex. Both shards are always resolved for edges stored in a graph.
#[derive(Debug, Clone, PartialEq, new)]
pub struct Edge<E> {
    pub source_shard: ShardId,
    pub target_shard: ShardId,
    pub to_key: String,
    pub data: E,
}

impl<E: Default> Default for Edge<E> {
    fn default() -> Self {
        Self {
            source_shard: UNASSIGNED_SHARD,
            target_shard: UNASSIGNED_SHARD,
            to_key: String::new(),
            data: E::default(),
        }
    }
}

impl<E> Edge<E> {
    pub fn target_id(&self) -> PregelId {
        PregelId::new(self.target_shard, self.to_key.clone())
    }
}

/// Splits a document id of the form `collection/key`.
pub fn split_document_id(document_id: &str) -> Option<(&str, &str)> {
    let mut parts = document_id.splitn(2, '/');
    let collection = parts.next().filter(|c| !c.is_empty())?;
    let key = parts.next().filter(|k| !k.is_empty())?;
    Some((collection, key))
}

#[cfg(test)]
mod tests {
    use crate::{split_document_id, Edge, PregelId, UNASSIGNED_SHARD};

    #[test]
    fn document_ids() {
        assert_eq!(split_document_id("persons/alice"), Some(("persons", "alice")));
        assert_eq!(split_document_id("persons/a/b"), Some(("persons", "a/b")));
        assert_eq!(split_document_id("persons"), None);
        assert_eq!(split_document_id("/alice"), None);
        assert_eq!(split_document_id("persons/"), None);
    }

    #[test]
    fn unresolved_ids() {
        assert!(!PregelId::new(UNASSIGNED_SHARD, "a".to_owned()).is_valid());
        assert!(!PregelId::new(0, String::new()).is_valid());
        let edge = Edge::new(0, 3, "b".to_owned(), ());
        assert_eq!(edge.target_id(), PregelId::new(3, "b".to_owned()));
        assert_eq!(Edge::<()>::default().target_shard, UNASSIGNED_SHARD);
    }
}
