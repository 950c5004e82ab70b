//! Criteria codec: field-path filters, sort and pagination, and their wire form.

pub mod codec;
pub mod order;
pub mod path;

pub use codec::*;
pub use order::{compare_values, values_equal};
pub use path::{FieldPath, Operator, Segment, SEPARATOR};

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A filter operand. Sets have no order and are emitted sorted.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Value(Value),
    Set(Vec<Value>),
}

impl FilterValue {
    pub fn to_wire(&self) -> Value {
        match self {
            FilterValue::Value(v) => v.clone(),
            FilterValue::Set(items) => {
                let mut items = items.clone();
                items.sort_by(compare_values);
                items.dedup_by(|a, b| values_equal(a, b));
                Value::Array(items)
            }
        }
    }
}

impl From<Value> for FilterValue {
    fn from(v: Value) -> Self {
        FilterValue::Value(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Value(Value::String(v.to_string()))
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Value(Value::String(v))
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Value(v.into())
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Value(v.into())
    }
}

/// Criteria keyed by the rendered field path.
pub type Filter = BTreeMap<String, FilterValue>;

/// Flattens criteria into the wire `filter` object.
pub fn encode_filter(filter: &Filter) -> Map<String, Value> {
    filter.iter().map(|(k, v)| (k.clone(), v.to_wire())).collect()
}
