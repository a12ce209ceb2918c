use hashbrown::{HashMap, HashSet};
use log::debug;
use pregel_api::{Aggregator, AggregatorValue};
use std::cmp::Ordering;
use std::collections::BTreeMap;

macro_rules! impl_aggregator_common {
    () => {
        fn value(&self) -> AggregatorValue {
            self.value
        }

        fn reset(&mut self) {
            self.value = self.init;
        }

        fn set(&mut self, value: AggregatorValue) {
            self.value = value;
        }

        fn is_permanent(&self) -> bool {
            self.permanent
        }

        fn boxed_clone(&self) -> Box<dyn Aggregator> {
            Box::new(self.clone())
        }
    };
}

macro_rules! create_aggregator {
    ($name:ident) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            init: AggregatorValue,
            value: AggregatorValue,
            permanent: bool,
        }

        impl $name {
            pub fn new(init: impl Into<AggregatorValue>) -> Self {
                let init = init.into();
                Self { init, value: init, permanent: false }
            }

            /// Keeps the value across supersteps instead of resetting it.
            pub fn permanent(mut self) -> Self {
                self.permanent = true;
                self
            }

            pub fn boxed(self) -> Box<dyn Aggregator> {
                Box::new(self)
            }
        }
    };
}

create_aggregator!(MaxAggregator);
create_aggregator!(MinAggregator);
create_aggregator!(SumAggregator);
create_aggregator!(OverwriteAggregator);
create_aggregator!(BoolOrAggregator);

impl Aggregator for MaxAggregator {
    fn aggregate(&mut self, value: AggregatorValue) {
        if value.compare(self.value) == Some(Ordering::Greater) {
            self.value = value;
        }
    }

    impl_aggregator_common!();
}

impl Aggregator for MinAggregator {
    fn aggregate(&mut self, value: AggregatorValue) {
        if value.compare(self.value) == Some(Ordering::Less) {
            self.value = value;
        }
    }

    impl_aggregator_common!();
}

impl Aggregator for SumAggregator {
    /// Ints stay ints; anything mixed with a float becomes a float. Booleans are ignored.
    fn aggregate(&mut self, value: AggregatorValue) {
        self.value = match (self.value, value) {
            (AggregatorValue::Int(a), AggregatorValue::Int(b)) => {
                AggregatorValue::Int(a.wrapping_add(b))
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => AggregatorValue::Float(a + b),
                _ => return,
            },
        };
    }

    impl_aggregator_common!();
}

impl Aggregator for OverwriteAggregator {
    fn aggregate(&mut self, value: AggregatorValue) {
        self.value = value;
    }

    impl_aggregator_common!();
}

impl Aggregator for BoolOrAggregator {
    fn aggregate(&mut self, value: AggregatorValue) {
        if let (Some(current), Some(new)) = (self.value.as_bool(), value.as_bool()) {
            self.value = AggregatorValue::Bool(current || new);
        }
    }

    impl_aggregator_common!();
}

/// A named set of aggregators.
///
/// The worker keeps one global handler whose values are read by vertices, and hands a `fresh`
/// copy to every compute partition. A partition copy holds only what its vertices contributed,
/// never the initial value. At the barrier the partials are folded back with `advance`.
#[derive(Debug)]
pub struct AggregatorHandler {
    aggregators: HashMap<String, Box<dyn Aggregator>>,
    touched: HashSet<String>,
    partial: bool,
}

impl AggregatorHandler {
    pub fn new(aggregators: Vec<(String, Box<dyn Aggregator>)>) -> Self {
        Self {
            aggregators: aggregators.into_iter().collect(),
            touched: HashSet::new(),
            partial: false,
        }
    }

    /// Same aggregators for one compute partition. Each one is seeded by its first contribution.
    pub fn fresh(&self) -> Self {
        let aggregators = self
            .aggregators
            .iter()
            .map(|(name, aggregator)| (name.clone(), aggregator.boxed_clone()))
            .collect();
        Self { aggregators, touched: HashSet::new(), partial: true }
    }

    pub fn aggregate(&mut self, name: &str, value: AggregatorValue) {
        match self.aggregators.get_mut(name) {
            Some(aggregator) => {
                let first = !self.touched.contains(name);
                if first {
                    self.touched.insert(name.to_owned());
                }
                if first && self.partial {
                    aggregator.set(value);
                } else {
                    aggregator.aggregate(value);
                }
            }
            None => debug!("Ignoring value for unknown aggregator '{}'", name),
        }
    }

    pub fn value(&self, name: &str) -> Option<AggregatorValue> {
        self.aggregators.get(name).map(|aggregator| aggregator.value())
    }

    /// Folds every aggregator `other` has touched into this handler.
    pub fn merge(&mut self, other: &AggregatorHandler) {
        for name in &other.touched {
            if let Some(value) = other.value(name) {
                self.aggregate(name, value);
            }
        }
    }

    /// Finishes a superstep: non-permanent aggregators restart from their initial value, then
    /// the partial values produced by the compute partitions are merged in.
    pub fn advance(&mut self, partials: impl IntoIterator<Item = AggregatorHandler>) {
        for aggregator in self.aggregators.values_mut() {
            if !aggregator.is_permanent() {
                aggregator.reset();
            }
        }
        self.touched.clear();
        for partial in partials {
            self.merge(&partial);
        }
    }

    pub fn values(&self) -> BTreeMap<String, AggregatorValue> {
        self.aggregators.iter().map(|(name, aggregator)| (name.clone(), aggregator.value())).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.is_empty()
    }
}
