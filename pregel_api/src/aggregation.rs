use serde_derive::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Value held by an aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregatorValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AggregatorValue {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            AggregatorValue::Int(v) => Some(v as f64),
            AggregatorValue::Float(v) => Some(v),
            AggregatorValue::Bool(_) => None,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            AggregatorValue::Int(v) => Some(v),
            AggregatorValue::Float(_) | AggregatorValue::Bool(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            AggregatorValue::Bool(v) => Some(v),
            AggregatorValue::Int(_) | AggregatorValue::Float(_) => None,
        }
    }

    /// Orders two numeric values. Ints compare exactly, mixed pairs compare as floats, booleans
    /// only compare with booleans.
    pub fn compare(self, other: AggregatorValue) -> Option<Ordering> {
        match (self, other) {
            (AggregatorValue::Int(a), AggregatorValue::Int(b)) => Some(a.cmp(&b)),
            (AggregatorValue::Bool(a), AggregatorValue::Bool(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            AggregatorValue::Int(_) => "int",
            AggregatorValue::Float(_) => "float",
            AggregatorValue::Bool(_) => "bool",
        }
    }
}

impl From<i64> for AggregatorValue {
    fn from(v: i64) -> Self {
        AggregatorValue::Int(v)
    }
}

impl From<f64> for AggregatorValue {
    fn from(v: f64) -> Self {
        AggregatorValue::Float(v)
    }
}

impl From<bool> for AggregatorValue {
    fn from(v: bool) -> Self {
        AggregatorValue::Bool(v)
    }
}

impl std::fmt::Display for AggregatorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            AggregatorValue::Int(v) => write!(f, "{}", v),
            AggregatorValue::Float(v) => write!(f, "{}", v),
            AggregatorValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// A global reduction value, updated by vertices and merged once per superstep.
///
/// `aggregate` must be commutative and associative: partial values from different compute
/// threads are merged in arbitrary order.
pub trait Aggregator: Send + Sync + std::fmt::Debug {
    fn aggregate(&mut self, value: AggregatorValue);

    fn value(&self) -> AggregatorValue;

    /// Restores the initial value.
    fn reset(&mut self);

    /// Replaces the current value. A compute partition seeds its copy with its first
    /// contribution so the initial value is only counted once, by the global aggregator.
    fn set(&mut self, value: AggregatorValue);

    /// Permanent aggregators keep their value across supersteps instead of being reset.
    fn is_permanent(&self) -> bool {
        false
    }

    fn boxed_clone(&self) -> Box<dyn Aggregator>;
}

#[cfg(test)]
mod tests {
    use crate::AggregatorValue;
    use std::cmp::Ordering;

    #[test]
    fn mixed_comparisons() {
        let inputs = vec![
            (AggregatorValue::Int(3), AggregatorValue::Int(7), Some(Ordering::Less)),
            (AggregatorValue::Float(2.5), AggregatorValue::Int(2), Some(Ordering::Greater)),
            (AggregatorValue::Bool(true), AggregatorValue::Bool(false), Some(Ordering::Greater)),
            (AggregatorValue::Bool(true), AggregatorValue::Int(1), None),
        ];
        for (a, b, expected) in inputs {
            assert_eq!(a.compare(b), expected);
        }
    }
}
