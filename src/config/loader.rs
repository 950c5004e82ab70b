//! Load config from memory or a directory of JSON files and resolve it into a catalog.

use crate::config::resolved::{Catalog, FieldDefault, FieldSchema, ModelSchema, Relation, DEFAULT_PER_PAGE};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::Path;

/// Build the catalog from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<Catalog, ConfigError> {
    validate(config)?;

    let mut models: Vec<ModelSchema> = config.models.iter().map(resolve_model).collect();

    for rc in &config.relations {
        let parent_field = rc
            .parent_field
            .clone()
            .or_else(|| models.iter().find(|m| m.name == rc.parent).and_then(|m| m.id.clone()))
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "identity",
                id: rc.parent.clone(),
            })?;
        let relation = Relation {
            kind: rc.kind,
            parent: rc.parent.clone(),
            child: rc.child.clone(),
            parent_field,
            child_field: rc
                .child_field
                .clone()
                .unwrap_or_else(|| format!("{}_id", rc.parent)),
            parent_name: rc.parent_name.clone().unwrap_or_else(|| rc.parent.clone()),
            child_name: rc.child_name.clone().unwrap_or_else(|| rc.child.clone()),
        };
        for m in models.iter_mut() {
            if m.name == relation.parent {
                m.children.push(relation.clone());
            }
            if m.name == relation.child {
                m.parents.push(relation.clone());
            }
        }
    }

    Ok(Catalog::new(models, config.resources.clone()))
}

fn resolve_model(mc: &ModelConfig) -> ModelSchema {
    let fields: Vec<FieldSchema> = mc.fields.iter().map(resolve_field).collect();
    let label = mc.label.clone().unwrap_or_else(|| {
        fields
            .iter()
            .find(|f| f.kind == FieldKind::Str && Some(&f.name) != mc.id.as_ref())
            .map(|f| vec![f.name.clone()])
            .unwrap_or_default()
    });
    let list = mc.list.clone().unwrap_or_else(|| {
        mc.id
            .iter()
            .cloned()
            .chain(label.iter().filter(|l| Some(*l) != mc.id.as_ref()).cloned())
            .collect()
    });
    ModelSchema {
        name: mc.name.clone(),
        singular: mc.singular.clone(),
        plural: mc.plural.clone(),
        endpoint: mc.endpoint.clone(),
        id: mc.id.clone(),
        sort: mc.sort.clone().unwrap_or_else(|| label.clone()),
        per_page: mc.per_page.unwrap_or(DEFAULT_PER_PAGE),
        fields,
        label,
        list,
        parents: Vec::new(),
        children: Vec::new(),
    }
}

fn resolve_field(fc: &FieldConfig) -> FieldSchema {
    let default = match (&fc.default, fc.kind) {
        (Some(v), _) => Some(FieldDefault::Value(v.clone())),
        (None, FieldKind::List | FieldKind::Set) => Some(FieldDefault::Value(json!([]))),
        (None, FieldKind::Dict) => Some(FieldDefault::Value(json!({}))),
        (None, _) => None,
    };
    FieldSchema {
        name: fc.name.clone(),
        kind: fc.kind,
        none: fc.none,
        auto: fc.auto,
        default,
        options: fc.options.clone(),
        validation: fc.validation.clone(),
        init: fc.init.clone(),
        inject: fc.inject.clone(),
        format: fc.format.clone(),
    }
}

/// Reads `models.json`, and `relations.json` / `resources.json` when present, from `dir`.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    Ok(FullConfig {
        models: read_json(&dir.join("models.json"))
            .await?
            .ok_or_else(|| ConfigError::Load(format!("{}: models.json not found", dir.display())))?,
        relations: read_json(&dir.join("relations.json")).await?.unwrap_or_default(),
        resources: read_json(&dir.join("resources.json")).await?.unwrap_or_default(),
    })
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        let config: FullConfig = serde_json::from_value(json!({
            "models": [
                {"name": "simple", "fields": [
                    {"name": "id", "kind": "int"},
                    {"name": "name"}
                ]},
                {"name": "plain", "id": null, "fields": [
                    {"name": "simple_id", "kind": "int"},
                    {"name": "name"}
                ]},
                {"name": "meta", "fields": [
                    {"name": "id", "kind": "int"},
                    {"name": "name"},
                    {"name": "things", "kind": "dict"},
                    {"name": "tags", "kind": "set", "default": ["b", "a"]}
                ]}
            ],
            "relations": [{"parent": "simple", "child": "plain"}]
        }))
        .unwrap();
        resolve(&config).unwrap()
    }

    #[test]
    fn derives_label_list_and_sort() {
        let catalog = catalog();
        let simple = catalog.model("simple").unwrap();
        assert_eq!(simple.label, vec!["name"]);
        assert_eq!(simple.list, vec!["id", "name"]);
        assert_eq!(simple.sort, vec!["name"]);
        assert_eq!(simple.per_page, DEFAULT_PER_PAGE);

        let plain = catalog.model("plain").unwrap();
        assert_eq!(plain.id, None);
        assert_eq!(plain.list, vec!["name"]);
    }

    #[test]
    fn links_relations_both_ways() {
        let catalog = catalog();
        let simple = catalog.model("simple").unwrap();
        let plain = catalog.model("plain").unwrap();
        assert_eq!(simple.children[0].child_field, "simple_id");
        assert_eq!(plain.ancestor("simple_id").unwrap().parent_field, "id");
        assert_eq!(plain.link("simple").unwrap().target(), "simple");
        assert_eq!(simple.link("plain").unwrap().keys(), ("id", "simple_id"));
        assert!(simple.child_relation("plain").is_some());
    }

    #[test]
    fn containers_default_to_empty() {
        let catalog = catalog();
        let meta = catalog.model("meta").unwrap();
        assert_eq!(meta.field("things").unwrap().default_value(), Some(json!({})));
        assert_eq!(meta.field("tags").unwrap().default_value(), Some(json!(["a", "b"])));
        assert_eq!(meta.blank()["name"], Value::Null);
    }

    #[tokio::test]
    async fn missing_models_file_is_a_load_error() {
        let dir = std::env::temp_dir().join(format!("restful-models-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        assert!(matches!(load_from_dir(&dir).await, Err(ConfigError::Load(_))));

        tokio::fs::write(
            dir.join("models.json"),
            r#"[{"name": "simple", "fields": [{"name": "id", "kind": "int"}, {"name": "name"}]}]"#,
        )
        .await
        .unwrap();
        let config = load_from_dir(&dir).await.unwrap();
        assert_eq!(config.models.len(), 1);
        assert!(config.relations.is_empty());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
