//! Form field descriptors and the per-resource overrides merged into them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One form field, in model declaration order. Only `name` and `kind` are always present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readonly: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inject: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        FieldDescriptor {
            name: name.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Value to resolve options against: the submitted one, else the stored one.
    pub fn current(&self) -> Option<&Value> {
        let present = |v: &&Value| !v.is_null();
        self.value
            .as_ref()
            .filter(present)
            .or_else(|| self.original.as_ref().filter(present))
    }
}

/// Resource-declared attributes for one field. Set keys replace the generated ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOverride {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readonly: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
}

impl FieldOverride {
    pub fn apply(&self, field: &mut FieldDescriptor) {
        if let Some(kind) = &self.kind {
            field.kind = kind.clone();
        }
        macro_rules! merge {
            ($($key:ident),*) => {
                $(if self.$key.is_some() {
                    field.$key = self.$key.clone();
                })*
            };
        }
        merge!(readonly, required, default, options, validation, init, inject, labels, format);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_keys_are_not_serialized() {
        let field = FieldDescriptor::new("name", "str");
        assert_eq!(serde_json::to_value(&field).unwrap(), json!({"name": "name", "kind": "str"}));
    }

    #[test]
    fn overrides_replace_set_keys_only() {
        let mut field = FieldDescriptor::new("name", "str");
        field.required = Some(true);
        let o: FieldOverride =
            serde_json::from_value(json!({"name": "name", "options": ["a", "b"], "format": "fancy"})).unwrap();
        o.apply(&mut field);
        assert_eq!(field.required, Some(true));
        assert_eq!(field.options, Some(vec![json!("a"), json!("b")]));
        assert_eq!(field.format, Some(json!("fancy")));
    }

    #[test]
    fn current_prefers_submitted_value() {
        let mut field = FieldDescriptor::new("unit_id", "int");
        field.original = Some(json!(1));
        assert_eq!(field.current(), Some(&json!(1)));
        field.value = Some(json!(2));
        assert_eq!(field.current(), Some(&json!(2)));
    }
}
