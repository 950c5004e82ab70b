//! Per-request option and label resolution for reference fields.

use crate::criteria::Page;
use crate::error::AppError;
use crate::fields::{FieldDescriptor, ResourceDefinition};
use crate::model::{Model, Repository};
use serde_json::{json, Map, Value};

/// Descriptors with submitted and stored values merged in, and parent options resolved
/// for every field that references a parent.
///
/// Submitted `values` replace stored ones wholesale: when anything was submitted, fields
/// missing from the submission carry no `value`.
pub async fn labeling(
    def: &ResourceDefinition,
    repo: &Repository,
    likes: &Map<String, Value>,
    values: Option<&Map<String, Value>>,
    originals: Option<&Map<String, Value>>,
) -> Result<Vec<FieldDescriptor>, AppError> {
    let submitted = values.filter(|v| !v.is_empty());
    let mut fields = def.fields.clone();

    for field in &mut fields {
        field.original = originals.and_then(|o| o.get(&field.name)).cloned();
        field.value = match submitted {
            Some(values) => values.get(&field.name).cloned(),
            None => field.original.clone(),
        };

        let Some(relation) = def.model.ancestor(&field.name) else {
            continue;
        };
        let like = likes.get(&field.name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

        let schema = repo.schema(&relation.parent)?;
        let mut parent = repo
            .many(&relation.parent)?
            .limit(Page::new(schema.per_page, 0));
        if let Some(term) = &like {
            parent = parent.like(term.clone());
        }
        let mut labels = parent.labels().await?;
        field.format = Some(Value::Array(labels.format.clone()));
        field.overflow = Some(labels.overflow);

        let outside = match (&like, field.current()) {
            (None, Some(current)) if !labels.contains(current) => Some(current.clone()),
            _ => None,
        };
        if let Some(current) = outside {
            labels = repo
                .one(&relation.parent)?
                .filter(&relation.parent_field, current)
                .labels()
                .await?;
            field.overflow = Some(true);
        }

        field.options = Some(labels.ids);
        field.labels = Some(labels.labels);
        field.like = like;
    }
    Ok(fields)
}

/// Display formats for the fields of retrieved records: parent labels for references,
/// literal formats and declared labels otherwise.
pub async fn formats(def: &ResourceDefinition, model: &Model) -> Result<Map<String, Value>, AppError> {
    let repo = model.repository();
    let mut out = Map::new();
    for field in &model.schema.fields {
        if let Some(relation) = model.schema.ancestor(&field.name) {
            let values: Vec<Value> = model
                .records
                .iter()
                .map(|r| r.get(&field.name).clone())
                .filter(|v| !v.is_null())
                .collect();
            let labels = repo
                .many(&relation.parent)?
                .filter_in(&relation.parent_field, values)
                .labels()
                .await?;
            out.insert(
                field.name.clone(),
                json!({"labels": labels.labels, "format": labels.format}),
            );
            continue;
        }
        let declared = def.field(&field.name).and_then(|d| d.labels.clone());
        if field.format.is_none() && declared.is_none() {
            continue;
        }
        let mut entry = Map::new();
        if let Some(format) = &field.format {
            entry.insert("format".into(), Value::String(format.clone()));
        }
        if let Some(labels) = declared {
            entry.insert("labels".into(), Value::Object(labels));
        }
        out.insert(field.name.clone(), Value::Object(entry));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ResourceConfig, FullConfig};
    use crate::store::MemorySource;
    use std::sync::Arc;

    async fn setup() -> (Repository, ResourceDefinition) {
        let config: FullConfig = serde_json::from_value(json!({
            "models": [
                {"name": "unit", "per_page": 2, "fields": [{"name": "id", "kind": "int"}, {"name": "name"}]},
                {"name": "test", "fields": [
                    {"name": "id", "kind": "int"},
                    {"name": "unit_id", "kind": "int"},
                    {"name": "name"}
                ]}
            ],
            "relations": [{"parent": "unit", "child": "test"}]
        }))
        .unwrap();
        let repo = Repository::new(resolve(&config).unwrap(), Arc::new(MemorySource::new()));
        let mut units = repo.bulk("unit").unwrap();
        for name in ["people", "stuff", "things"] {
            units.add(json!({"name": name}).as_object().cloned().unwrap()).unwrap();
        }
        units.create().await.unwrap();
        let def = ResourceDefinition::build(repo.schema("test").unwrap(), &ResourceConfig::default()).unwrap();
        (repo, def)
    }

    #[tokio::test]
    async fn options_overflow_without_like() {
        let (repo, def) = setup().await;
        let fields = labeling(&def, &repo, &Map::new(), None, None).await.unwrap();
        let unit = fields.iter().find(|f| f.name == "unit_id").unwrap();
        assert_eq!(unit.overflow, Some(true));
        assert_eq!(unit.options, Some(vec![json!(1), json!(2)]));
        assert_eq!(unit.format, Some(json!([null])));
        assert_eq!(unit.labels.as_ref().unwrap()["1"], json!(["people"]));
        assert_eq!(unit.like, None);
    }

    #[tokio::test]
    async fn like_narrows_options() {
        let (repo, def) = setup().await;
        let likes = json!({"unit_id": "thi"}).as_object().cloned().unwrap();
        let fields = labeling(&def, &repo, &likes, None, None).await.unwrap();
        let unit = fields.iter().find(|f| f.name == "unit_id").unwrap();
        assert_eq!(unit.overflow, Some(false));
        assert_eq!(unit.options, Some(vec![json!(3)]));
        assert_eq!(unit.like.as_deref(), Some("thi"));
    }

    #[tokio::test]
    async fn current_value_outside_window_is_resolved() {
        let (repo, def) = setup().await;
        let originals = json!({"id": 1, "unit_id": 3, "name": "ya"}).as_object().cloned().unwrap();
        let values = json!({"name": "sure"}).as_object().cloned().unwrap();

        let fields = labeling(&def, &repo, &Map::new(), None, Some(&originals)).await.unwrap();
        let unit = fields.iter().find(|f| f.name == "unit_id").unwrap();
        assert_eq!(unit.value, Some(json!(3)));
        assert_eq!(unit.options, Some(vec![json!(3)]));
        assert_eq!(unit.labels.as_ref().unwrap()["3"], json!(["things"]));
        assert_eq!(unit.overflow, Some(true));

        let fields = labeling(&def, &repo, &Map::new(), Some(&values), Some(&originals)).await.unwrap();
        let name = fields.iter().find(|f| f.name == "name").unwrap();
        assert_eq!((name.value.clone(), name.original.clone()), (Some(json!("sure")), Some(json!("ya"))));
        let unit = fields.iter().find(|f| f.name == "unit_id").unwrap();
        assert_eq!(unit.value, None);
        assert_eq!(unit.options, Some(vec![json!(3)]));
    }
}
