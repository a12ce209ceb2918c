use crate::{Document, DocumentBuilder};

/// Extracts fixed-size vertex and edge values from raw documents and writes vertex values back.
///
/// Decoding is total: a malformed document must produce the default value instead of an error,
/// so that a single bad document never aborts a shard load.
pub trait GraphFormat<V, E>: Send + Sync {
    /// Size of a materialized vertex value. Returning `0` selects topology-only mode, in which the
    /// graph store does not allocate vertex values at all.
    fn estimated_vertex_size(&self) -> usize {
        std::mem::size_of::<V>()
    }

    fn estimated_edge_size(&self) -> usize {
        std::mem::size_of::<E>()
    }

    /// Whether edge payloads are decoded. Unweighted algorithms can opt out to save memory.
    fn stores_edge_data(&self) -> bool {
        self.estimated_edge_size() > 0
    }

    fn copy_vertex_data(&self, document_id: &str, document: &Document, target: &mut V);

    fn copy_edge_data(&self, document: &Document, target: &mut E);

    /// Writes `value` into `builder`. Returning `false` skips the write for this vertex.
    fn build_vertex_document(&self, builder: &mut DocumentBuilder, value: &V) -> bool;
}

/// A commutative and associative fold of messages addressed to the same vertex.
pub trait MessageCombiner<M>: Send + Sync {
    fn combine(&self, first: &mut M, second: &M);
}
