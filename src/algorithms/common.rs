use crate::error::PregelError;
use hashbrown::HashMap;
use pregel_api::{Document, DocumentBuilder, GraphFormat, MessageCombiner};
use serde_json::{Number, Value};

/// Vertex and edge values are single floats read from (and written to) document attributes.
#[derive(Debug, Clone, new)]
pub struct FloatFormat {
    source_field: Option<String>,
    result_field: String,
    vertex_default: f64,
    weight_field: Option<String>,
    weight_default: f64,
}

impl GraphFormat<f64, f64> for FloatFormat {
    fn stores_edge_data(&self) -> bool {
        self.weight_field.is_some() || self.weight_default != 0.0
    }

    fn copy_vertex_data(&self, _document_id: &str, document: &Document, target: &mut f64) {
        *target = self
            .source_field
            .as_ref()
            .and_then(|field| document.get(field))
            .and_then(Value::as_f64)
            .unwrap_or(self.vertex_default);
    }

    fn copy_edge_data(&self, document: &Document, target: &mut f64) {
        *target = self
            .weight_field
            .as_ref()
            .and_then(|field| document.get(field))
            .and_then(Value::as_f64)
            .unwrap_or(self.weight_default);
    }

    /// Infinite values (unreached vertices) are not written.
    fn build_vertex_document(&self, builder: &mut DocumentBuilder, value: &f64) -> bool {
        match Number::from_f64(*value) {
            Some(number) if value.is_finite() => {
                builder.insert(self.result_field.clone(), Value::Number(number));
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SumCombiner;

impl MessageCombiner<f64> for SumCombiner {
    fn combine(&self, first: &mut f64, second: &f64) {
        *first += *second;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MinCombiner;

impl MessageCombiner<f64> for MinCombiner {
    fn combine(&self, first: &mut f64, second: &f64) {
        if *second < *first {
            *first = *second;
        }
    }
}

pub type AlgorithmParams = HashMap<String, Value>;

pub fn float_param(
    algorithm: &'static str,
    params: &AlgorithmParams,
    name: &'static str,
    default: f64,
) -> Result<f64, PregelError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => value.as_f64().ok_or_else(|| {
            PregelError::Parameter(
                algorithm,
                name,
                format!("should be a number but found {}", value),
            )
        }),
    }
}

pub fn optional_string_param(
    algorithm: &'static str,
    params: &AlgorithmParams,
    name: &'static str,
) -> Result<Option<String>, PregelError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if !value.is_empty() => Ok(Some(value.clone())),
        Some(value) => Err(PregelError::Parameter(
            algorithm,
            name,
            format!("should be a non-empty string but found {}", value),
        )),
    }
}

pub fn string_param(
    algorithm: &'static str,
    params: &AlgorithmParams,
    name: &'static str,
    default: &str,
) -> Result<String, PregelError> {
    Ok(optional_string_param(algorithm, params, name)?.unwrap_or_else(|| default.to_owned()))
}
