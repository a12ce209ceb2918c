use crate::{Aggregator, AggregatorValue, Edge, GraphFormat, MessageCombiner, PregelId, Superstep};
use std::fmt::Debug;

/// Messages delivered to a vertex for the current superstep.
pub type MessageIterator<'a, M> = std::slice::Iter<'a, M>;

/// Error raised by a vertex computation. It aborts the whole job.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeError(pub String);

impl ComputeError {
    pub fn new(message: impl Into<String>) -> Self {
        ComputeError(message.into())
    }
}

impl std::fmt::Display for ComputeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ComputeError {}

/// Everything a vertex computation can see and do while computing a single vertex.
pub trait ComputeContext<V, E, M> {
    fn vertex_id(&self) -> PregelId;

    /// The vertex value. Writes are kept for the following supersteps.
    fn vertex_data(&mut self) -> &mut V;

    fn edges(&self) -> &[Edge<E>];

    fn send_message(&mut self, target: PregelId, message: M);

    /// Sends a copy of `message` along every outgoing edge.
    fn send_message_to_all_neighbours(&mut self, message: M);

    /// Deactivates the vertex until it receives a message.
    fn vote_halt(&mut self);

    fn global_superstep(&self) -> Superstep;

    /// Contributes `value` to the named aggregator. The merged result becomes visible in the next
    /// superstep.
    fn aggregate(&mut self, name: &str, value: AggregatorValue);

    /// The value the named aggregator had at the end of the previous superstep.
    fn aggregated_value(&self, name: &str) -> Option<AggregatorValue>;

    /// Number of vertices in the local graph.
    fn vertex_count(&self) -> usize;

    /// Number of edges in the local graph.
    fn edge_count(&self) -> usize;
}

/// The per-vertex compute callback of an algorithm.
pub trait VertexComputation<V, E, M>: Send + Sync {
    fn compute(
        &self,
        context: &mut dyn ComputeContext<V, E, M>,
        messages: MessageIterator<M>,
    ) -> Result<(), ComputeError>;
}

/// The primary trait of the plugin API: a bundle of format, computation, combiner and
/// aggregators, selected by name when a job is configured.
pub trait Algorithm: Send + Sync {
    /// The data type of the vertex value.
    type Vertex: Default + Clone + Debug + Send + Sync;
    /// The data type of the edge payload.
    type Edge: Default + Clone + Debug + Send + Sync;
    /// The data type of the messages exchanged between vertices.
    type Message: Clone + Debug + Send + Sync;

    fn name(&self) -> &'static str;

    fn input_format(&self) -> Box<dyn GraphFormat<Self::Vertex, Self::Edge>>;

    fn create_computation(
        &self,
    ) -> Box<dyn VertexComputation<Self::Vertex, Self::Edge, Self::Message>>;

    fn message_combiner(&self) -> Option<Box<dyn MessageCombiner<Self::Message>>> {
        None
    }

    fn aggregators(&self) -> Vec<(String, Box<dyn Aggregator>)> {
        Vec::new()
    }
}
