//! Resolved catalog: config validated and flattened for runtime use.

use crate::config::{FieldKind, RelationKind, ResourceConfig};
use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Default value of a field: a literal, or a generator invoked per record.
#[derive(Clone, Debug)]
pub enum FieldDefault {
    Value(Value),
    Generator(fn() -> Value),
}

#[derive(Clone, Debug)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
    pub none: bool,
    pub auto: Option<bool>,
    pub default: Option<FieldDefault>,
    pub options: Vec<Value>,
    pub validation: Option<Value>,
    pub init: Option<Value>,
    pub inject: Option<Value>,
    pub format: Option<String>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldSchema {
            name: name.into(),
            kind,
            none: false,
            auto: None,
            default: None,
            options: Vec::new(),
            validation: None,
            init: None,
            inject: None,
            format: None,
        }
    }

    pub fn is_auto(&self) -> bool {
        self.auto.unwrap_or(false)
    }

    /// Produces the default, invoking generators. Sets come out sorted.
    pub fn default_value(&self) -> Option<Value> {
        let value = match self.default.as_ref()? {
            FieldDefault::Value(v) => v.clone(),
            FieldDefault::Generator(f) => f(),
        };
        Some(self.kind.normalize(value))
    }
}

impl FieldKind {
    /// Coerces a wire value (often a query-string string) to this kind. Values that do
    /// not parse are passed through for validation to reject.
    pub fn coerce(&self, value: Value) -> Value {
        match value {
            Value::String(s) => self.coerce_str(s),
            Value::Array(items) if !self.is_container() => {
                Value::Array(items.into_iter().map(|v| self.coerce(v)).collect())
            }
            other => self.normalize(other),
        }
    }

    fn coerce_str(&self, s: String) -> Value {
        let t = s.trim();
        let parsed = match self {
            FieldKind::Int => t.parse::<i64>().ok().map(Value::from),
            FieldKind::Float => t.parse::<f64>().ok().map(Value::from),
            FieldKind::Bool => {
                if t.eq_ignore_ascii_case("true") || t == "1" {
                    Some(Value::Bool(true))
                } else if t.eq_ignore_ascii_case("false") || t == "0" {
                    Some(Value::Bool(false))
                } else {
                    None
                }
            }
            FieldKind::Uuid => uuid::Uuid::parse_str(t)
                .ok()
                .map(|u| Value::String(u.to_string())),
            FieldKind::Datetime => chrono::DateTime::parse_from_rfc3339(t)
                .ok()
                .map(|dt| Value::String(dt.with_timezone(&chrono::Utc).to_rfc3339())),
            _ => None,
        };
        parsed.unwrap_or(Value::String(s))
    }

    /// Canonical form of an already-typed value: sets are sorted and deduplicated.
    pub fn normalize(&self, value: Value) -> Value {
        match (self, value) {
            (FieldKind::Set, Value::Array(mut items)) => {
                items.sort_by(crate::criteria::compare_values);
                items.dedup();
                Value::Array(items)
            }
            (_, value) => value,
        }
    }

    /// Whether a non-null value has the shape this kind stores.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Int => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Str => value.is_string(),
            FieldKind::Uuid => value.as_str().is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            FieldKind::Datetime => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
            FieldKind::List | FieldKind::Set => value.is_array(),
            FieldKind::Dict => value.is_object(),
        }
    }
}

/// A parent/child link between two models, seen from either side.
#[derive(Clone, Debug)]
pub struct Relation {
    pub kind: RelationKind,
    pub parent: String,
    pub child: String,
    pub parent_field: String,
    pub child_field: String,
    pub parent_name: String,
    pub child_name: String,
}

/// A relation seen from one model: toward its parent or toward its children.
#[derive(Clone, Copy, Debug)]
pub enum Link<'a> {
    Parent(&'a Relation),
    Child(&'a Relation),
}

impl<'a> Link<'a> {
    /// Name of the model on the other side.
    pub fn target(&self) -> &'a str {
        match *self {
            Link::Parent(r) => &r.parent,
            Link::Child(r) => &r.child,
        }
    }

    /// (field on this model, field on the target) that the link joins on.
    pub fn keys(&self) -> (&'a str, &'a str) {
        match *self {
            Link::Parent(r) => (&r.child_field, &r.parent_field),
            Link::Child(r) => (&r.parent_field, &r.child_field),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelSchema {
    pub name: String,
    pub singular: Option<String>,
    pub plural: Option<String>,
    pub endpoint: Option<String>,
    pub id: Option<String>,
    pub fields: Vec<FieldSchema>,
    pub label: Vec<String>,
    pub list: Vec<String>,
    pub sort: Vec<String>,
    pub per_page: usize,
    /// Relations where this model is the child.
    pub parents: Vec<Relation>,
    /// Relations where this model is the parent.
    pub children: Vec<Relation>,
}

pub const DEFAULT_PER_PAGE: usize = 100;

impl ModelSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldSchema> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn id_field(&self) -> Option<&FieldSchema> {
        self.id.as_deref().and_then(|id| self.field(id))
    }

    pub fn singular(&self) -> String {
        self.singular.clone().unwrap_or_else(|| self.name.clone())
    }

    pub fn plural(&self) -> String {
        self.plural
            .clone()
            .unwrap_or_else(|| format!("{}s", self.singular()))
    }

    pub fn endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| self.singular())
    }

    /// The relation whose child field is `field`, i.e. `field` references a parent.
    pub fn ancestor(&self, field: &str) -> Option<&Relation> {
        self.parents.iter().find(|r| r.child_field == field)
    }

    /// Relation reachable through the accessor `name`, from either side.
    pub fn link(&self, name: &str) -> Option<Link<'_>> {
        self.parents
            .iter()
            .find(|r| r.parent_name == name)
            .map(Link::Parent)
            .or_else(|| {
                self.children
                    .iter()
                    .find(|r| r.child_name == name)
                    .map(Link::Child)
            })
    }

    pub fn child_relation(&self, name: &str) -> Option<&Relation> {
        self.children.iter().find(|r| r.child_name == name)
    }

    /// Record with every field set to its default, or null.
    pub fn blank(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.default_value().unwrap_or(Value::Null)))
            .collect()
    }
}

/// Every model of a configuration, plus the resource declarations that expose them.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub models: Vec<Arc<ModelSchema>>,
    index: HashMap<String, usize>,
    pub resources: Vec<ResourceConfig>,
}

impl Catalog {
    pub fn new(models: Vec<ModelSchema>, resources: Vec<ResourceConfig>) -> Self {
        let index = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        Catalog {
            models: models.into_iter().map(Arc::new).collect(),
            index,
            resources,
        }
    }

    pub fn model(&self, name: &str) -> Option<&Arc<ModelSchema>> {
        self.index.get(name).map(|&i| &self.models[i])
    }

    pub fn require(&self, name: &str) -> Result<Arc<ModelSchema>, ConfigError> {
        self.model(name)
            .cloned()
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "model",
                id: name.to_string(),
            })
    }

    /// Applies `f` to every schema, e.g. a source's initialisation.
    pub fn init_with(&mut self, f: impl Fn(&mut ModelSchema)) {
        for model in &mut self.models {
            f(Arc::make_mut(model));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_query_strings_by_kind() {
        assert_eq!(FieldKind::Int.coerce(json!("12")), json!(12));
        assert_eq!(FieldKind::Int.coerce(json!("twelve")), json!("twelve"));
        assert_eq!(FieldKind::Float.coerce(json!("1.5")), json!(1.5));
        assert_eq!(FieldKind::Bool.coerce(json!("TRUE")), json!(true));
        assert_eq!(FieldKind::Str.coerce(json!("1")), json!("1"));
        assert_eq!(FieldKind::Int.coerce(json!(["1", "2"])), json!([1, 2]));
        assert_eq!(
            FieldKind::Uuid.coerce(json!("A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11")),
            json!("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11")
        );
    }

    #[test]
    fn set_defaults_come_out_sorted() {
        let mut field = FieldSchema::new("tags", FieldKind::Set);
        field.default = Some(FieldDefault::Value(json!(["b", "a", "b"])));
        assert_eq!(field.default_value(), Some(json!(["a", "b"])));

        fn now() -> Value {
            json!("generated")
        }
        let mut field = FieldSchema::new("stamp", FieldKind::Str);
        field.default = Some(FieldDefault::Generator(now));
        assert_eq!(field.default_value(), Some(json!("generated")));
    }

    #[test]
    fn accepts_checks_shape() {
        assert!(FieldKind::Int.accepts(&json!(3)));
        assert!(!FieldKind::Int.accepts(&json!(3.5)));
        assert!(FieldKind::Dict.accepts(&json!({})));
        assert!(FieldKind::Datetime.accepts(&json!("2024-01-01T00:00:00Z")));
        assert!(!FieldKind::Uuid.accepts(&json!("nope")));
    }
}
