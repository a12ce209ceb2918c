use crate::aggregator::AggregatorHandler;
use crate::worker::messages::MessageCache;
use pregel_api::{AggregatorValue, ComputeContext, Edge, PregelId, Superstep};

/// Per-vertex view handed to a `VertexComputation`.
pub(crate) struct VertexContext<'v, 'c, V, E, M> {
    pub id: PregelId,
    pub value: &'v mut V,
    pub edges: &'v [Edge<E>],
    pub messages: &'v mut MessageCache<'c, M>,
    pub global_aggregators: &'v AggregatorHandler,
    pub partial_aggregators: &'v mut AggregatorHandler,
    pub superstep: Superstep,
    pub vertex_count: usize,
    pub edge_count: usize,
    pub voted_halt: bool,
}

impl<'v, 'c, V, E, M: Clone> ComputeContext<V, E, M> for VertexContext<'v, 'c, V, E, M> {
    fn vertex_id(&self) -> PregelId {
        self.id.clone()
    }

    fn vertex_data(&mut self) -> &mut V {
        &mut *self.value
    }

    fn edges(&self) -> &[Edge<E>] {
        self.edges
    }

    fn send_message(&mut self, target: PregelId, message: M) {
        self.messages.send(target, message);
    }

    fn send_message_to_all_neighbours(&mut self, message: M) {
        for edge in self.edges {
            self.messages.send(edge.target_id(), message.clone());
        }
    }

    fn vote_halt(&mut self) {
        self.voted_halt = true;
    }

    fn global_superstep(&self) -> Superstep {
        self.superstep
    }

    fn aggregate(&mut self, name: &str, value: AggregatorValue) {
        self.partial_aggregators.aggregate(name, value);
    }

    fn aggregated_value(&self, name: &str) -> Option<AggregatorValue> {
        self.global_aggregators.value(name)
    }

    fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    fn edge_count(&self) -> usize {
        self.edge_count
    }
}
