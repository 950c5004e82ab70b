//! Resource definitions: naming, list columns and field descriptors for one model.

use crate::config::{ModelSchema, ResourceConfig};
use crate::error::ResourceError;
use crate::fields::FieldDescriptor;
use serde_json::Value;
use std::sync::Arc;

/// Values worth copying into a descriptor: not null, false, zero or empty.
fn present(value: &Option<Value>) -> Option<Value> {
    value.as_ref().filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    })
    .cloned()
}

#[derive(Clone, Debug)]
pub struct ResourceDefinition {
    pub name: String,
    pub model: Arc<ModelSchema>,
    pub singular: String,
    pub plural: String,
    pub list: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl ResourceDefinition {
    pub fn build(model: Arc<ModelSchema>, config: &ResourceConfig) -> Result<Self, ResourceError> {
        let name = config.name.clone().unwrap_or_else(|| model.name.clone());
        let singular = config
            .singular
            .clone()
            .or_else(|| model.singular.clone())
            .unwrap_or_else(|| model.name.clone());
        let plural = config
            .plural
            .clone()
            .or_else(|| model.plural.clone())
            .unwrap_or_else(|| format!("{}s", singular));

        let mut fields = Vec::with_capacity(model.fields.len());
        for field in &model.fields {
            let mut descriptor = FieldDescriptor::new(field.name.clone(), field.kind.as_str());
            if !field.options.is_empty() {
                descriptor.options = Some(field.options.clone());
            }
            descriptor.validation = present(&field.validation);
            descriptor.init = present(&field.init);
            descriptor.inject = present(&field.inject);
            if field.is_auto() {
                descriptor.readonly = Some(true);
            }
            match field.default_value() {
                Some(default) => descriptor.default = Some(default),
                None => {
                    let labelled = model
                        .label
                        .iter()
                        .any(|l| l.split(crate::criteria::SEPARATOR).next() == Some(field.name.as_str()));
                    if !field.is_auto() && (!field.none || labelled) {
                        descriptor.required = Some(true);
                    }
                }
            }
            for o in config.fields.iter().filter(|o| o.name == field.name) {
                o.apply(&mut descriptor);
            }
            fields.push(descriptor);
        }

        let list = config.list.clone().unwrap_or_else(|| model.list.clone());
        for entry in &list {
            let lead = entry.split(crate::criteria::SEPARATOR).next().unwrap_or_default();
            if model.field(lead).is_none() {
                return Err(ResourceError::new(
                    name,
                    format!("cannot find field {} from list", entry),
                ));
            }
        }

        Ok(ResourceDefinition {
            name,
            model,
            singular,
            plural,
            list,
            fields,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Route paths, the record route only when the model has an identity.
    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints = vec![format!("/{}", self.singular)];
        if self.model.id.is_some() {
            endpoints.push(format!("/{}/:id", self.singular));
        }
        endpoints
    }
}
