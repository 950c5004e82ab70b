//! In-memory source: rows per model behind a `tokio` lock.

use crate::config::{FieldKind, ModelSchema};
use crate::criteria::values_equal;
use crate::error::AppError;
use crate::model::{create_children, update_children, Action, Model, Source};
use crate::store::matcher::{sort_rows, Matcher, Row, Rows};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct Store {
    rows: Rows,
    counters: HashMap<String, i64>,
}

impl Store {
    fn generate(&mut self, model: &str, kind: FieldKind) -> Value {
        match kind {
            FieldKind::Uuid | FieldKind::Str => Value::String(uuid::Uuid::new_v4().to_string()),
            _ => {
                let next = self.counters.entry(model.to_string()).or_insert(0);
                *next += 1;
                Value::from(*next)
            }
        }
    }
}

#[derive(Default)]
pub struct MemorySource {
    store: RwLock<Store>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored row of a model, in insertion order.
    pub async fn rows(&self, model: &str) -> Vec<Row> {
        self.store
            .read()
            .await
            .rows
            .get(model)
            .cloned()
            .unwrap_or_default()
    }
}

fn matching(store: &Store, model: &Model) -> Result<Vec<usize>, AppError> {
    Matcher::new(model.repository().catalog(), &store.rows).indices(
        &model.schema,
        &model.criteria_paths(),
        model.like.as_deref(),
    )
}

fn position(rows: &[Row], schema: &ModelSchema, id: &Value) -> Option<usize> {
    let key = schema.id.as_deref()?;
    rows.iter()
        .position(|r| r.get(key).is_some_and(|v| values_equal(v, id)))
}

#[async_trait]
impl Source for MemorySource {
    async fn create(&self, model: &mut Model) -> Result<(), AppError> {
        let schema = model.schema.clone();
        let created: Vec<usize> = (0..model.records.len())
            .filter(|&i| model.records[i].action == Action::Create)
            .collect();
        {
            let mut store = self.store.write().await;
            for &i in &created {
                let record = &mut model.records[i];
                if let Some(id) = schema.id_field() {
                    if id.is_auto() && record.get(&id.name).is_null() {
                        let value = store.generate(&schema.name, id.kind);
                        record.set(&id.name, value);
                    }
                }
                store
                    .rows
                    .entry(schema.name.clone())
                    .or_default()
                    .push(record.values().clone());
            }
        }
        tracing::debug!(model = %schema.name, created = created.len(), "memory create");
        for &i in &created {
            let record = &mut model.records[i];
            create_children(&schema, record).await?;
            record.persist();
        }
        if model.bulk {
            model.records.clear();
        }
        model.action = Action::Update;
        Ok(())
    }

    async fn count(&self, model: &mut Model) -> Result<u64, AppError> {
        let store = self.store.read().await;
        Ok(matching(&store, model)?.len() as u64)
    }

    async fn retrieve(&self, model: &mut Model, verify: bool) -> Result<bool, AppError> {
        let mut rows: Vec<Row> = {
            let store = self.store.read().await;
            let table = store.rows.get(&model.schema.name);
            matching(&store, model)?
                .into_iter()
                .filter_map(|i| table.and_then(|t| t.get(i)).cloned())
                .collect()
        };
        let sort = if model.sort.is_empty() {
            &model.schema.sort
        } else {
            &model.sort
        };
        sort_rows(&mut rows, sort);
        let total = rows.len();
        let page = model.page;
        let rows: Vec<Row> = rows
            .into_iter()
            .skip(page.offset)
            .take(page.limit.unwrap_or(usize::MAX))
            .collect();
        if let Some(limit) = page.limit {
            model.overflow = model.overflow || total > limit;
        }
        tracing::debug!(model = %model.name(), matched = total, returned = rows.len(), "memory retrieve");
        model.absorb(rows, verify)
    }

    async fn update(&self, model: &mut Model) -> Result<u64, AppError> {
        if model.action == Action::Retrieve {
            let values = model.pending.clone().unwrap_or_default();
            let mut store = self.store.write().await;
            let found = matching(&store, model)?;
            if let Some(table) = store.rows.get_mut(&model.schema.name) {
                for &i in &found {
                    for (k, v) in &values {
                        table[i].insert(k.clone(), v.clone());
                    }
                }
            }
            tracing::debug!(model = %model.name(), updated = found.len(), "memory mass update");
            return Ok(found.len() as u64);
        }

        let schema = model.schema.clone();
        let Some(id) = schema.id.clone() else {
            return Err(model.error("nothing to update from"));
        };
        if model
            .records
            .iter()
            .any(|r| r.action == Action::Update && r.get(&id).is_null())
        {
            return Err(model.error("nothing to update from"));
        }

        let mut updated = 0;
        {
            let mut store = self.store.write().await;
            let table = store.rows.entry(schema.name.clone()).or_default();
            for record in model.each(Action::Update) {
                if let Some(at) = position(table, &schema, record.get(&id)) {
                    table[at].extend(record.changed());
                    updated += 1;
                }
            }
        }
        for record in model.each(Action::Update) {
            update_children(&schema, record).await?;
            record.persist();
        }
        tracing::debug!(model = %schema.name, updated, "memory update");
        Ok(updated)
    }

    async fn delete(&self, model: &mut Model) -> Result<u64, AppError> {
        let mut store = self.store.write().await;
        let doomed: HashSet<usize> = if model.action == Action::Retrieve {
            matching(&store, model)?.into_iter().collect()
        } else if model.schema.id.is_some() {
            let ids = model.ids();
            let table = store.rows.get(&model.schema.name).map(Vec::as_slice).unwrap_or(&[]);
            let doomed = ids
                .iter()
                .filter_map(|id| position(table, &model.schema, id))
                .collect();
            for record in &mut model.records {
                record.forget();
            }
            model.action = Action::Create;
            doomed
        } else {
            return Err(model.error("nothing to delete from"));
        };
        if let Some(table) = store.rows.get_mut(&model.schema.name) {
            let mut i = 0;
            table.retain(|_| {
                let keep = !doomed.contains(&i);
                i += 1;
                keep
            });
        }
        tracing::debug!(model = %model.name(), deleted = doomed.len(), "memory delete");
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use crate::model::Repository;
    use serde_json::json;
    use std::sync::Arc;

    fn object(v: Value) -> serde_json::Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    async fn repo() -> Repository {
        let config: FullConfig = serde_json::from_value(json!({
            "models": [
                {"name": "unit", "fields": [{"name": "id", "kind": "int"}, {"name": "name"}]},
                {"name": "test", "label": ["unit_id", "name"], "fields": [
                    {"name": "id", "kind": "int"},
                    {"name": "unit_id", "kind": "int"},
                    {"name": "name"},
                    {"name": "meta", "kind": "dict"}
                ]}
            ],
            "relations": [{"parent": "unit", "child": "test"}]
        }))
        .unwrap();
        let repo = Repository::new(resolve(&config).unwrap(), Arc::new(MemorySource::new()));

        let mut units = repo.create_many("unit", vec![object(json!({"name": "people"})), object(json!({"name": "stuff"}))]).unwrap();
        units.create().await.unwrap();
        let mut tests = repo.bulk("test").unwrap();
        tests.add(object(json!({"unit_id": 1, "name": "ya", "meta": {"a": 1}}))).unwrap();
        tests.add(object(json!({"unit_id": 2, "name": "sure", "meta": {"a": 2, "b": [3]}}))).unwrap();
        tests.create().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn criteria_follow_paths_and_relations() {
        let repo = repo().await;

        let mut nested = repo.many("test").unwrap().filter("meta__a__gt", 1i64);
        nested.retrieve(true).await.unwrap();
        assert_eq!(nested.ids(), vec![json!(2)]);

        let mut indexed = repo.many("test").unwrap().filter("meta__b__0", 3i64);
        assert_eq!(indexed.count().await.unwrap(), 1);

        let mut related = repo.many("test").unwrap().filter("unit__name", "people");
        related.retrieve(true).await.unwrap();
        assert_eq!(related.records[0].get("name"), &json!("ya"));

        let mut parents = repo.many("unit").unwrap().filter("test__name__in", json!(["ya", "sure"]));
        assert_eq!(parents.count().await.unwrap(), 2);

        let unknown = repo.many("test").unwrap().filter("nope", "x").count().await.unwrap_err();
        assert_eq!(unknown.to_string(), "test: unknown criterion nope");
    }

    #[tokio::test]
    async fn like_reaches_parent_labels() {
        let repo = repo().await;
        let mut found = repo.many("test").unwrap().like("stu");
        found.retrieve(true).await.unwrap();
        assert_eq!(found.ids(), vec![json!(2)]);
    }

    #[tokio::test]
    async fn labels_expand_parent_references() {
        let repo = repo().await;
        let labels = repo.many("test").unwrap().labels().await.unwrap();
        assert_eq!(labels.format, vec![Value::Null, Value::Null]);
        assert_eq!(labels.labels["1"], json!(["people", "ya"]));
        assert_eq!(labels.labels["2"], json!(["stuff", "sure"]));
    }

    #[tokio::test]
    async fn mass_update_then_delete() {
        let repo = repo().await;
        let mut all = repo.many("test").unwrap();
        all.set(object(json!({"name": "same"}))).unwrap();
        assert_eq!(all.update().await.unwrap(), 2);

        let mut one = repo.one("test").unwrap().filter("id", 1i64);
        one.retrieve(true).await.unwrap();
        assert_eq!(one.delete().await.unwrap(), 1);
        assert_eq!(one.action, Action::Create);

        assert_eq!(repo.many("test").unwrap().count().await.unwrap(), 1);
    }
}
