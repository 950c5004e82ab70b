//! Resource registry: which resource answers which path segment.

use crate::config::Catalog;
use crate::error::{AppError, ResourceError};
use crate::fields::ResourceDefinition;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Registry {
    resources: Vec<Arc<ResourceDefinition>>,
    by_segment: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declared resources first, then one default resource for every model left without one.
    pub fn from_catalog(catalog: &Catalog) -> Result<Self, AppError> {
        let mut registry = Registry::new();
        for config in &catalog.resources {
            let model = catalog.require(&config.model)?;
            registry.bind(ResourceDefinition::build(model, config)?)?;
        }
        for model in &catalog.models {
            if catalog.resources.iter().any(|r| r.model == model.name) {
                continue;
            }
            let def = ResourceDefinition::build(model.clone(), &Default::default())?;
            if registry.by_segment.contains_key(&def.singular) {
                tracing::warn!(model = %model.name, segment = %def.singular, "segment taken, model not exposed");
                continue;
            }
            registry.bind(def)?;
        }
        Ok(registry)
    }

    pub fn bind(&mut self, def: ResourceDefinition) -> Result<(), ResourceError> {
        if self.by_segment.contains_key(&def.singular) {
            return Err(ResourceError::new(
                def.name.clone(),
                format!("/{} already bound", def.singular),
            ));
        }
        tracing::info!(resource = %def.name, endpoints = ?def.endpoints(), "resource bound");
        self.by_segment.insert(def.singular.clone(), self.resources.len());
        self.resources.push(Arc::new(def));
        Ok(())
    }

    pub fn resource(&self, segment: &str) -> Option<&Arc<ResourceDefinition>> {
        self.by_segment.get(segment).map(|&i| &self.resources[i])
    }

    pub fn resources(&self) -> &[Arc<ResourceDefinition>] {
        &self.resources
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.resources.iter().flat_map(|r| r.endpoints()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use serde_json::json;

    #[test]
    fn declared_resources_win_then_defaults() {
        let config: FullConfig = serde_json::from_value(json!({
            "models": [
                {"name": "simple", "fields": [{"name": "id", "kind": "int"}, {"name": "name"}]},
                {"name": "plain", "id": null, "fields": [{"name": "name"}]}
            ],
            "resources": [{"model": "simple", "singular": "thing"}]
        }))
        .unwrap();
        let registry = Registry::from_catalog(&resolve(&config).unwrap()).unwrap();
        assert_eq!(registry.endpoints(), vec!["/thing", "/thing/:id", "/plain"]);
        assert_eq!(registry.resource("thing").unwrap().plural, "things");
        assert!(registry.resource("simple").is_none());
    }

    #[test]
    fn duplicate_segments_are_rejected() {
        let config: FullConfig = serde_json::from_value(json!({
            "models": [{"name": "simple", "fields": [{"name": "id", "kind": "int"}, {"name": "name"}]}],
            "resources": [{"model": "simple"}, {"model": "simple", "name": "again"}]
        }))
        .unwrap();
        let err = Registry::from_catalog(&resolve(&config).unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "again: /simple already bound");
    }
}
