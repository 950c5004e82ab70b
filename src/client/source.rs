//! A source whose records live behind a resource API.

use crate::client::transport::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::config::ModelSchema;
use crate::error::AppError;
use crate::model::{create_children, mark_auto_id, update_children, Action, Labels, Model, Source};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const API_ERROR: &str = "API Error";

pub struct RemoteSource {
    url: String,
    transport: Arc<dyn Transport>,
}

impl RemoteSource {
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        RemoteSource {
            url: url.into(),
            transport,
        }
    }

    /// Network source with the default request timeout.
    pub fn connect(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self::new(url, Arc::new(ReqwestTransport::new()?)))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends a request for a model and decodes `key` out of the response.
    async fn call(
        &self,
        model: &mut Model,
        method: HttpMethod,
        path: String,
        body: Value,
        key: &str,
    ) -> Result<Value, AppError> {
        let response = self
            .transport
            .send(&self.url, HttpRequest::new(method, path, body))
            .await
            .map_err(|e| model.error(e))?;
        Self::result(model, key, response)
    }

    /// Errors carry the server message; a reported overflow sticks to the model.
    pub fn result(model: &mut Model, key: &str, response: HttpResponse) -> Result<Value, AppError> {
        if response.status >= 400 {
            let message = response
                .body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(API_ERROR);
            let prefix = format!("{}: ", model.name());
            let message = message.strip_prefix(&prefix).unwrap_or(message);
            return Err(model.error(message));
        }
        if let Some(true) = response.body.get("overflow").and_then(Value::as_bool) {
            model.overflow = true;
        }
        Ok(response.body.get(key).cloned().unwrap_or(Value::Null))
    }

    fn collection(schema: &ModelSchema) -> String {
        format!("/{}", schema.endpoint())
    }

    fn count_of(model: &Model, value: Value) -> Result<u64, AppError> {
        value
            .as_u64()
            .ok_or_else(|| model.error(format!("expected a count, got {}", value)))
    }
}

#[async_trait]
impl Source for RemoteSource {
    fn init(&self, schema: &mut ModelSchema) {
        let singular = schema.singular.clone().unwrap_or_else(|| schema.name.clone());
        schema.plural.get_or_insert_with(|| format!("{}s", singular));
        schema.endpoint.get_or_insert_with(|| singular.clone());
        schema.singular = Some(singular);
        mark_auto_id(schema);
    }

    async fn create(&self, model: &mut Model) -> Result<(), AppError> {
        let schema = model.schema.clone();
        let creating: Vec<usize> = (0..model.records.len())
            .filter(|&i| model.records[i].action == Action::Create)
            .collect();
        if creating.is_empty() {
            return Ok(());
        }
        let payload: Vec<Value> = creating
            .iter()
            .map(|&i| {
                let record = &model.records[i];
                let values: Map<String, Value> = schema
                    .fields
                    .iter()
                    .filter(|f| !f.is_auto())
                    .map(|f| (f.name.clone(), record.get(&f.name).clone()))
                    .collect();
                Value::Object(values)
            })
            .collect();

        let plural = schema.plural();
        let created = self
            .call(
                model,
                HttpMethod::Post,
                Self::collection(&schema),
                json!({ plural.clone(): payload }),
                &plural,
            )
            .await?;
        let created = created.as_array().cloned().unwrap_or_default();

        for (n, &i) in creating.iter().enumerate() {
            let record = &mut model.records[i];
            if let Some(id) = schema.id_field().filter(|f| f.is_auto()) {
                if let Some(value) = created.get(n).and_then(|c| c.get(&id.name)) {
                    record.set(&id.name, value.clone());
                }
            }
            if !model.bulk {
                create_children(&schema, record).await?;
            }
            record.persist();
        }
        if model.bulk {
            model.records.clear();
        }
        model.action = Action::Update;
        Ok(())
    }

    async fn count(&self, model: &mut Model) -> Result<u64, AppError> {
        let body = json!({"filter": model.criteria_wire(), "count": true});
        let plural = model.schema.plural();
        let path = Self::collection(&model.schema);
        let n = self.call(model, HttpMethod::Get, path, body, &plural).await?;
        Self::count_of(model, n)
    }

    async fn retrieve(&self, model: &mut Model, verify: bool) -> Result<bool, AppError> {
        let mut body = Map::new();
        body.insert("filter".into(), Value::Object(model.criteria_wire()));
        if !model.sort.is_empty() {
            body.insert("sort".into(), json!(model.sort));
        }
        if let Some(limit) = model.page.limit {
            let mut spec = json!({"per_page": limit});
            if model.page.offset > 0 {
                spec["start"] = json!(model.page.offset);
            }
            body.insert("limit".into(), spec);
        }
        let plural = model.schema.plural();
        let path = Self::collection(&model.schema);
        let matches = self
            .call(model, HttpMethod::Get, path, Value::Object(body), &plural)
            .await?;
        let rows = match matches {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(model.error(format!("expected a record, got {}", other))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => return Err(model.error(format!("expected a list, got {}", other))),
        };
        model.absorb(rows, verify)
    }

    async fn update(&self, model: &mut Model) -> Result<u64, AppError> {
        let schema = model.schema.clone();
        let path = Self::collection(&schema);

        if let (Action::Retrieve, Some(values)) = (model.action, model.pending.clone()) {
            let body = json!({"filter": model.criteria_wire(), schema.plural(): values});
            let n = self.call(model, HttpMethod::Patch, path, body, "updated").await?;
            return Self::count_of(model, n);
        }

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
        for i in 0..model.records.len() {
            if model.records[i].action != Action::Update {
                continue;
            }
            let record = &model.records[i];
            let values: Map<String, Value> = record
                .changed()
                .into_iter()
                .filter(|(k, _)| schema.field(k).is_some_and(|f| !f.is_auto()))
                .collect();
            let path = format!("{}/{}", path, Labels::key(record.get(&id)));
            let body = json!({ schema.singular(): values });
            let n = self.call(model, HttpMethod::Patch, path, body, "updated").await?;
            updated += Self::count_of(model, n)?;
            let record = &mut model.records[i];
            update_children(&schema, record).await?;
            record.persist();
        }
        Ok(updated)
    }

    async fn delete(&self, model: &mut Model) -> Result<u64, AppError> {
        let criteria = if model.action == Action::Retrieve {
            model.criteria_wire()
        } else if let Some(id) = model.schema.id.clone() {
            let ids = model.ids();
            for record in &mut model.records {
                record.forget();
            }
            model.action = Action::Create;
            let mut criteria = Map::new();
            criteria.insert(format!("{}__in", id), Value::Array(ids));
            criteria
        } else {
            return Err(model.error("nothing to delete from"));
        };
        let path = Self::collection(&model.schema);
        let n = self
            .call(model, HttpMethod::Delete, path, json!({"filter": criteria}), "deleted")
            .await?;
        Self::count_of(model, n)
    }
}
