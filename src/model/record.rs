//! One record of a model: current values, last persisted values, and pending children.

use crate::criteria::values_equal;
use crate::model::{Action, Model};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

static NULL: Value = Value::Null;

#[derive(Clone, Debug)]
pub struct Record {
    pub action: Action,
    values: Map<String, Value>,
    originals: Map<String, Value>,
    /// Child models keyed by relation accessor, created after this record.
    pub children: BTreeMap<String, Model>,
}

impl Record {
    /// A record waiting to be created.
    pub fn new(values: Map<String, Value>) -> Self {
        Record {
            action: Action::Create,
            values,
            originals: Map::new(),
            children: BTreeMap::new(),
        }
    }

    /// A record read back from a source.
    pub fn persisted(values: Map<String, Value>) -> Self {
        Record {
            action: Action::Update,
            originals: values.clone(),
            values,
            children: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn originals(&self) -> &Map<String, Value> {
        &self.originals
    }

    /// Fields whose value differs from what was last persisted.
    pub fn changed(&self) -> Map<String, Value> {
        self.values
            .iter()
            .filter(|(k, v)| !self.originals.get(*k).is_some_and(|o| values_equal(o, v)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Marks the current values as persisted.
    pub fn persist(&mut self) {
        self.originals = self.values.clone();
        self.action = Action::Update;
    }

    /// Turns a deleted record back into one that would be created again.
    pub fn forget(&mut self) {
        self.originals = Map::new();
        self.action = Action::Create;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn changed_tracks_edits_since_persist() {
        let mut record = Record::persisted(map(json!({"id": 1, "name": "ya", "n": 1})));
        assert!(record.changed().is_empty());
        record.set("name", json!("sure"));
        record.set("n", json!(1.0));
        assert_eq!(record.changed(), map(json!({"name": "sure"})));
        record.persist();
        assert!(record.changed().is_empty());
        assert_eq!(record.get("missing"), &Value::Null);
    }

    #[test]
    fn new_records_are_created_then_updated() {
        let mut record = Record::new(map(json!({"name": "ya"})));
        assert_eq!(record.action, Action::Create);
        record.persist();
        assert_eq!(record.action, Action::Update);
        record.forget();
        assert_eq!(record.action, Action::Create);
        assert!(record.originals().is_empty());
    }
}
