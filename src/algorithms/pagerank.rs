use crate::aggregator::MaxAggregator;
use crate::algorithms::common::{float_param, optional_string_param, string_param};
use crate::algorithms::common::{AlgorithmParams, FloatFormat, SumCombiner};
use crate::error::PregelError;
use pregel_api::{
    Aggregator, AggregatorValue, Algorithm, ComputeContext, ComputeError, GraphFormat,
    MessageCombiner, MessageIterator, VertexComputation,
};

const NAME: &str = "pagerank";
const CONVERGENCE: &str = "convergence";
const DAMPING: f64 = 0.85;
const DEFAULT_THRESHOLD: f64 = 0.000_01;
const DEFAULT_RESULT_FIELD: &str = "pagerank";

#[derive(Debug, Clone)]
pub struct PageRank {
    threshold: f64,
    source_field: Option<String>,
    result_field: String,
}

impl PageRank {
    pub fn new(threshold: f64, result_field: &str) -> Self {
        Self { threshold, source_field: None, result_field: result_field.to_owned() }
    }

    pub fn instance(params: &AlgorithmParams) -> Result<Self, PregelError> {
        let threshold = float_param(NAME, params, "threshold", DEFAULT_THRESHOLD)?;
        if threshold.is_nan() || threshold <= 0.0 {
            return Err(PregelError::Parameter(
                NAME,
                "threshold",
                format!("should be positive but found {}", threshold),
            ));
        }
        Ok(Self {
            threshold,
            source_field: optional_string_param(NAME, params, "sourceField")?,
            result_field: string_param(NAME, params, "resultField", DEFAULT_RESULT_FIELD)?,
        })
    }
}

impl Algorithm for PageRank {
    type Vertex = f64;
    type Edge = f64;
    type Message = f64;

    fn name(&self) -> &'static str {
        NAME
    }

    fn input_format(&self) -> Box<dyn GraphFormat<f64, f64>> {
        Box::new(FloatFormat::new(
            self.source_field.clone(),
            self.result_field.clone(),
            0.0,
            None,
            0.0,
        ))
    }

    fn create_computation(&self) -> Box<dyn VertexComputation<f64, f64, f64>> {
        Box::new(PageRankComputation { threshold: self.threshold })
    }

    fn message_combiner(&self) -> Option<Box<dyn MessageCombiner<f64>>> {
        Some(Box::new(SumCombiner))
    }

    fn aggregators(&self) -> Vec<(String, Box<dyn Aggregator>)> {
        vec![(CONVERGENCE.to_owned(), MaxAggregator::new(0.0).boxed())]
    }
}

struct PageRankComputation {
    threshold: f64,
}

impl VertexComputation<f64, f64, f64> for PageRankComputation {
    fn compute(
        &self,
        context: &mut dyn ComputeContext<f64, f64, f64>,
        messages: MessageIterator<f64>,
    ) -> Result<(), ComputeError> {
        let superstep = context.global_superstep();
        let vertex_count = context.vertex_count() as f64;
        if superstep == 0 {
            *context.vertex_data() = 1.0 / vertex_count;
        } else {
            let rank = (1.0 - DAMPING) / vertex_count + DAMPING * messages.sum::<f64>();
            let delta = (rank - *context.vertex_data()).abs();
            *context.vertex_data() = rank;
            context.aggregate(CONVERGENCE, AggregatorValue::Float(delta));
        }

        // The aggregate seen in superstep 1 only covers the initial assignment.
        let converged = superstep > 1
            && context
                .aggregated_value(CONVERGENCE)
                .and_then(AggregatorValue::as_f64)
                .map_or(false, |delta| delta < self.threshold);
        if converged {
            context.vote_halt();
        } else {
            let out_degree = context.edges().len();
            if out_degree > 0 {
                let share = *context.vertex_data() / out_degree as f64;
                context.send_message_to_all_neighbours(share);
            }
        }
        Ok(())
    }
}
