use crate::algorithms::pagerank::PageRank;
use crate::algorithms::sssp::Sssp;
use crate::worker::{execute_algorithm, JobContext, JobResult};
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashMap;
use log::warn;

pub trait AlgorithmBuilder {
    fn run(&self, context: &JobContext) -> JobResult;
}

macro_rules! create_builder {
    ($builder:ident, $name:ident) => {
        pub struct $builder;

        impl AlgorithmBuilder for $builder {
            fn run(&self, context: &JobContext) -> JobResult {
                match $name::instance(&context.job.params) {
                    Ok(algorithm) => execute_algorithm(&algorithm, context),
                    Err(e) => {
                        warn!("Could not create algorithm '{}': {}", context.job.algorithm, e);
                        JobResult::failed(&context.job.algorithm, e.to_string())
                    }
                }
            }
        }
    };
}

create_builder!(PageRankBuilder, PageRank);
create_builder!(SsspBuilder, Sssp);

pub fn initialize_algorithms(
    algorithms: &mut HashMap<String, Box<dyn AlgorithmBuilder>, DefaultHashBuilder>,
) {
    algorithms.insert(String::from("pagerank"), Box::new(PageRankBuilder));
    algorithms.insert(String::from("pr"), Box::new(PageRankBuilder));
    algorithms.insert(String::from("sssp"), Box::new(SsspBuilder));
}

