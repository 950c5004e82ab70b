//! Label sets: display values per record identity, used to render references as options.

use crate::criteria::FieldPath;
use crate::error::AppError;
use crate::model::Model;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Labels {
    pub id: Option<String>,
    pub label: Vec<String>,
    /// One format per label value, after parent labels are expanded.
    pub format: Vec<Value>,
    pub ids: Vec<Value>,
    /// Stringified identity to label values.
    pub labels: Map<String, Value>,
    pub overflow: bool,
}

impl Labels {
    /// Identities are object keys on the wire.
    pub fn key(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.labels.contains_key(&Self::key(value))
    }

    /// Builds the label set of the records a model holds. Label fields that reference a
    /// parent are replaced by the parent's own label values.
    pub async fn compose(model: &Model) -> Result<Labels, AppError> {
        let schema = &model.schema;
        let mut format = Vec::new();
        let mut parents: HashMap<&str, Labels> = HashMap::new();

        for field in &schema.label {
            match schema.ancestor(field) {
                Some(relation) => {
                    let values = model
                        .records
                        .iter()
                        .map(|r| r.get(field).clone())
                        .filter(|v| !v.is_null())
                        .collect();
                    let mut parent = model
                        .repository()
                        .many(&relation.parent)?
                        .filter_in(&relation.parent_field, values);
                    let labels = parent.labels().await?;
                    format.extend(labels.format.iter().cloned());
                    parents.insert(field.as_str(), labels);
                }
                None => format.push(
                    schema
                        .field(&FieldPath::parse(field).field)
                        .and_then(|f| f.format.clone())
                        .map(Value::String)
                        .unwrap_or(Value::Null),
                ),
            }
        }

        let mut ids = Vec::with_capacity(model.records.len());
        let mut labels = Map::new();
        for record in &model.records {
            let id = schema
                .id
                .as_ref()
                .map(|id| record.get(id).clone())
                .unwrap_or(Value::Null);
            let mut values = Vec::new();
            for field in &schema.label {
                match parents.get(field.as_str()) {
                    Some(parent) => match parent.labels.get(&Labels::key(record.get(field))) {
                        Some(Value::Array(items)) => values.extend(items.iter().cloned()),
                        _ => values.extend(std::iter::repeat(Value::Null).take(parent.format.len())),
                    },
                    None => values.push(
                        FieldPath::parse(field)
                            .lookup(record.values())
                            .cloned()
                            .unwrap_or(Value::Null),
                    ),
                }
            }
            labels.insert(Labels::key(&id), Value::Array(values));
            ids.push(id);
        }

        Ok(Labels {
            id: schema.id.clone(),
            label: schema.label.clone(),
            format,
            ids,
            labels,
            overflow: model.overflow,
        })
    }
}
