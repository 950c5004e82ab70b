//! Config types: models, fields, relations and resources as they appear in JSON.

use crate::fields::FieldOverride;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Value kind of a model field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    #[default]
    Str,
    Uuid,
    Datetime,
    List,
    Dict,
    Set,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::Str => "str",
            FieldKind::Uuid => "uuid",
            FieldKind::Datetime => "datetime",
            FieldKind::List => "list",
            FieldKind::Dict => "dict",
            FieldKind::Set => "set",
        }
    }

    /// Container kinds are stored whole and addressed with nested paths.
    pub fn is_container(&self) -> bool {
        matches!(self, FieldKind::List | FieldKind::Dict | FieldKind::Set)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    /// Whether the field may be absent (null).
    #[serde(default)]
    pub none: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// Unspecified means the backing source decides (identity fields become auto).
    #[serde(default)]
    pub auto: Option<bool>,
    #[serde(default)]
    pub options: Vec<Value>,
    #[serde(default)]
    pub validation: Option<Value>,
    #[serde(default)]
    pub init: Option<Value>,
    #[serde(default)]
    pub inject: Option<Value>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// Identity field. Absent means `"id"`; `null` means the model has no identity.
    #[serde(default = "default_id", deserialize_with = "nullable")]
    pub id: Option<String>,
    #[serde(default)]
    pub singular: Option<String>,
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub label: Option<Vec<String>>,
    #[serde(default)]
    pub list: Option<Vec<String>>,
    #[serde(default)]
    pub sort: Option<Vec<String>>,
    #[serde(default)]
    pub per_page: Option<usize>,
    pub fields: Vec<FieldConfig>,
}

fn default_id() -> Option<String> {
    Some("id".into())
}

fn nullable<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Option::<String>::deserialize(deserializer)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    #[default]
    OneToMany,
    OneToOne,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelationConfig {
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub kind: RelationKind,
    /// Parent field referenced by the child. Defaults to the parent's identity.
    #[serde(default)]
    pub parent_field: Option<String>,
    /// Child field holding the reference. Defaults to `{parent}_id`.
    #[serde(default)]
    pub child_field: Option<String>,
    /// Accessor for the parent on the child. Defaults to the parent model name.
    #[serde(default)]
    pub parent_name: Option<String>,
    /// Accessor for the children on the parent. Defaults to the child model name.
    #[serde(default)]
    pub child_name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource name used in build errors. Defaults to the model name.
    #[serde(default)]
    pub name: Option<String>,
    pub model: String,
    #[serde(default)]
    pub singular: Option<String>,
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub list: Option<Vec<String>>,
    #[serde(default)]
    pub fields: Vec<FieldOverride>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}
