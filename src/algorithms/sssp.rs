use crate::algorithms::common::{optional_string_param, string_param};
use crate::algorithms::common::{AlgorithmParams, FloatFormat, MinCombiner};
use crate::error::PregelError;
use pregel_api::{
    Algorithm, ComputeContext, ComputeError, Document, DocumentBuilder, GraphFormat,
    MessageCombiner, MessageIterator, PregelId, VertexComputation,
};

const NAME: &str = "sssp";
const DEFAULT_RESULT_FIELD: &str = "distance";
const DEFAULT_WEIGHT: f64 = 1.0;

/// Single source shortest paths over weighted edges. Vertices the source cannot reach keep an
/// infinite distance and are not written back.
#[derive(Debug, Clone)]
pub struct Sssp {
    source: String,
    weight_field: Option<String>,
    result_field: String,
}

impl Sssp {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_owned(),
            weight_field: None,
            result_field: DEFAULT_RESULT_FIELD.to_owned(),
        }
    }

    pub fn instance(params: &AlgorithmParams) -> Result<Self, PregelError> {
        let source = optional_string_param(NAME, params, "source")?.ok_or_else(|| {
            PregelError::Parameter(NAME, "source", "a source document id is required".to_owned())
        })?;
        if pregel_api::split_document_id(&source).is_none() {
            return Err(PregelError::Parameter(
                NAME,
                "source",
                format!("'{}' is not of the form collection/key", source),
            ));
        }
        Ok(Self {
            source,
            weight_field: optional_string_param(NAME, params, "weightField")?,
            result_field: string_param(NAME, params, "resultField", DEFAULT_RESULT_FIELD)?,
        })
    }
}

/// Starts every vertex at infinity except the source.
struct SsspFormat {
    source: String,
    values: FloatFormat,
}

impl GraphFormat<f64, f64> for SsspFormat {
    fn stores_edge_data(&self) -> bool {
        true
    }

    fn copy_vertex_data(&self, document_id: &str, _document: &Document, target: &mut f64) {
        *target = if document_id == self.source { 0.0 } else { f64::INFINITY };
    }

    fn copy_edge_data(&self, document: &Document, target: &mut f64) {
        self.values.copy_edge_data(document, target);
    }

    fn build_vertex_document(&self, builder: &mut DocumentBuilder, value: &f64) -> bool {
        self.values.build_vertex_document(builder, value)
    }
}

impl Algorithm for Sssp {
    type Vertex = f64;
    type Edge = f64;
    type Message = f64;

    fn name(&self) -> &'static str {
        NAME
    }

    fn input_format(&self) -> Box<dyn GraphFormat<f64, f64>> {
        Box::new(SsspFormat {
            source: self.source.clone(),
            values: FloatFormat::new(
                None,
                self.result_field.clone(),
                f64::INFINITY,
                self.weight_field.clone(),
                DEFAULT_WEIGHT,
            ),
        })
    }

    fn create_computation(&self) -> Box<dyn VertexComputation<f64, f64, f64>> {
        Box::new(SsspComputation)
    }

    fn message_combiner(&self) -> Option<Box<dyn MessageCombiner<f64>>> {
        Some(Box::new(MinCombiner))
    }
}

struct SsspComputation;

impl VertexComputation<f64, f64, f64> for SsspComputation {
    fn compute(
        &self,
        context: &mut dyn ComputeContext<f64, f64, f64>,
        messages: MessageIterator<f64>,
    ) -> Result<(), ComputeError> {
        let current = *context.vertex_data();
        let closest = messages.fold(f64::INFINITY, |min, distance| min.min(*distance));
        let improved = closest < current;
        if improved {
            *context.vertex_data() = closest;
        }
        if improved || (context.global_superstep() == 0 && current.is_finite()) {
            let distance = *context.vertex_data();
            let updates: Vec<(PregelId, f64)> = context
                .edges()
                .iter()
                .map(|edge| (edge.target_id(), distance + edge.data))
                .collect();
            for (target, distance) in updates {
                context.send_message(target, distance);
            }
        }
        context.vote_halt();
        Ok(())
    }
}
