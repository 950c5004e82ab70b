//! Config validation: referential integrity between models, relations and resources.

use crate::config::FullConfig;
use crate::criteria::FieldPath;
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut fields_by_model: HashMap<&str, HashSet<&str>> = HashMap::new();
    for m in &config.models {
        let names: HashSet<&str> = m.fields.iter().map(|f| f.name.as_str()).collect();
        if names.len() != m.fields.len() {
            return Err(ConfigError::Validation(format!("{}: duplicate field", m.name)));
        }
        if fields_by_model.insert(m.name.as_str(), names).is_some() {
            return Err(ConfigError::DuplicateModel(m.name.clone()));
        }
    }

    for m in &config.models {
        let names = &fields_by_model[m.name.as_str()];
        let check = |field: &str| -> Result<(), ConfigError> {
            if names.contains(field) {
                Ok(())
            } else {
                Err(ConfigError::UnknownField {
                    model: m.name.clone(),
                    field: field.to_string(),
                })
            }
        };
        if let Some(id) = &m.id {
            check(id)?;
        }
        for entry in m.label.iter().flatten().chain(m.list.iter().flatten()) {
            check(&FieldPath::parse(entry).field)?;
        }
        for entry in m.sort.iter().flatten() {
            check(entry.trim_start_matches(['+', '-']))?;
        }
    }

    let ids: HashMap<&str, Option<&str>> = config
        .models
        .iter()
        .map(|m| (m.name.as_str(), m.id.as_deref()))
        .collect();
    for r in &config.relations {
        let parent = fields_by_model
            .get(r.parent.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "model",
                id: r.parent.clone(),
            })?;
        let child = fields_by_model
            .get(r.child.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "model",
                id: r.child.clone(),
            })?;
        let parent_field = r
            .parent_field
            .as_deref()
            .or(ids[r.parent.as_str()])
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "relation {} -> {}: parent has no identity, parent_field required",
                    r.parent, r.child
                ))
            })?;
        if !parent.contains(parent_field) {
            return Err(ConfigError::UnknownField {
                model: r.parent.clone(),
                field: parent_field.to_string(),
            });
        }
        let child_field = r
            .child_field
            .clone()
            .unwrap_or_else(|| format!("{}_id", r.parent));
        if !child.contains(child_field.as_str()) {
            return Err(ConfigError::UnknownField {
                model: r.child.clone(),
                field: child_field,
            });
        }
    }

    for res in &config.resources {
        if !fields_by_model.contains_key(res.model.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "model",
                id: res.model.clone(),
            });
        }
    }
    Ok(())
}
