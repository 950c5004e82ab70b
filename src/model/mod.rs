//! Models: stateful query/record handles bound to a source through a repository.
//!
//! A [`Model`] is either creating records (`Action::Create`), describing a retrieval that has
//! not run yet (`Action::Retrieve`), or holding persisted records (`Action::Update`).

pub mod labels;
pub mod record;
pub mod source;
pub mod validation;

pub use labels::Labels;
pub use record::Record;
pub use source::{create_children, mark_auto_id, update_children, Source};

use crate::config::{resolve, Catalog, FullConfig, Link, ModelSchema, RelationKind};
use crate::criteria::{encode_filter, FieldPath, Filter, FilterValue, Page};
use crate::error::AppError;
use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Create,
    Retrieve,
    Update,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    One,
    Many,
}

/// A catalog bound to the source that stores its records.
#[derive(Clone)]
pub struct Repository {
    catalog: Arc<Catalog>,
    source: Arc<dyn Source>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("models", &self.catalog.models.len())
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Lets the source initialise every schema, then freezes the catalog.
    pub fn new(mut catalog: Catalog, source: Arc<dyn Source>) -> Self {
        catalog.init_with(|schema| source.init(schema));
        Repository {
            catalog: Arc::new(catalog),
            source,
        }
    }

    pub fn from_config(config: &FullConfig, source: Arc<dyn Source>) -> Result<Self, AppError> {
        Ok(Self::new(resolve(config)?, source))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn schema(&self, name: &str) -> Result<Arc<ModelSchema>, AppError> {
        Ok(self.catalog.require(name)?)
    }

    fn model(&self, name: &str, action: Action, mode: Mode) -> Result<Model, AppError> {
        Ok(Model {
            repo: self.clone(),
            schema: self.schema(name)?,
            action,
            mode,
            bulk: false,
            optional: false,
            records: Vec::new(),
            criteria: Filter::new(),
            like: None,
            sort: Vec::new(),
            page: Page::default(),
            pending: None,
            overflow: false,
        })
    }

    /// One new record, not yet created.
    pub fn create(&self, name: &str, values: Map<String, Value>) -> Result<Model, AppError> {
        let mut model = self.model(name, Action::Create, Mode::One)?;
        model.add(values)?;
        Ok(model)
    }

    /// Several new records, kept after creation.
    pub fn create_many(&self, name: &str, list: Vec<Map<String, Value>>) -> Result<Model, AppError> {
        let mut model = self.model(name, Action::Create, Mode::Many)?;
        for values in list {
            model.add(values)?;
        }
        Ok(model)
    }

    /// New records that are dropped once created.
    pub fn bulk(&self, name: &str) -> Result<Model, AppError> {
        let mut model = self.model(name, Action::Create, Mode::Many)?;
        model.bulk = true;
        Ok(model)
    }

    /// Retrieval of exactly one record.
    pub fn one(&self, name: &str) -> Result<Model, AppError> {
        self.model(name, Action::Retrieve, Mode::One)
    }

    /// Retrieval of any number of records.
    pub fn many(&self, name: &str) -> Result<Model, AppError> {
        self.model(name, Action::Retrieve, Mode::Many)
    }
}

#[derive(Clone, Debug)]
pub struct Model {
    repo: Repository,
    pub schema: Arc<ModelSchema>,
    pub action: Action,
    pub mode: Mode,
    pub bulk: bool,
    /// Retrieving nothing is not an error (one-to-one children).
    pub optional: bool,
    pub records: Vec<Record>,
    pub criteria: Filter,
    pub like: Option<String>,
    pub sort: Vec<String>,
    pub page: Page,
    /// Values to apply to every match of a retrieval that has not run.
    pub pending: Option<Map<String, Value>>,
    pub overflow: bool,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn error(&self, message: impl Into<String>) -> AppError {
        AppError::model(self.schema.name.clone(), message)
    }

    /// Adds a criterion. `like` is the free-text search; other keys are field paths.
    pub fn filter(mut self, key: &str, value: impl Into<FilterValue>) -> Self {
        let value = value.into();
        if key == "like" {
            self.like = match value.to_wire() {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            };
            return self;
        }
        let path = FieldPath::parse(key);
        let value = match value {
            FilterValue::Value(v) => FilterValue::Value(self.coerce_criterion(&self.schema, &path, v)),
            FilterValue::Set(items) => FilterValue::Set(
                items
                    .into_iter()
                    .map(|v| self.coerce_criterion(&self.schema, &path, v))
                    .collect(),
            ),
        };
        self.criteria.insert(key.to_string(), value);
        self
    }

    /// `{field}__in` over a set of values.
    pub fn filter_in(self, field: &str, values: Vec<Value>) -> Self {
        self.filter(&format!("{}__in", field), FilterValue::Set(values))
    }

    /// Applies decoded wire criteria.
    pub fn filters(self, criteria: &Map<String, Value>) -> Self {
        criteria
            .iter()
            .fold(self, |model, (k, v)| model.filter(k, v.clone()))
    }

    pub fn like(mut self, term: impl Into<String>) -> Self {
        self.like = Some(term.into());
        self
    }

    pub fn sort(mut self, fields: Vec<String>) -> Self {
        self.sort = fields;
        self
    }

    pub fn limit(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    fn coerce_criterion(&self, schema: &ModelSchema, path: &FieldPath, value: Value) -> Value {
        if path.operator.is_some_and(|op| op.is_textual()) {
            return value;
        }
        if let Some(field) = schema.field(&path.field) {
            return if path.path.is_empty() {
                field.kind.coerce(value)
            } else {
                value
            };
        }
        let target = schema
            .link(&path.field)
            .and_then(|link| self.repo.catalog.model(link.target()));
        match (target, path.descend()) {
            (Some(target), Some(rest)) => self.coerce_criterion(target, &rest, value),
            _ => value,
        }
    }

    /// Coerces and checks submitted values against the schema.
    fn prepare(&self, values: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        values
            .into_iter()
            .map(|(k, v)| match self.schema.field(&k) {
                Some(field) => Ok((k, field.kind.coerce(v))),
                None => Err(self.error(format!("unknown field {}", k))),
            })
            .collect()
    }

    /// Adds a record to create, defaults filled in.
    pub fn add(&mut self, values: Map<String, Value>) -> Result<&mut Self, AppError> {
        let mut record = self.schema.blank();
        record.extend(self.prepare(values)?);
        self.records.push(Record::new(record));
        Ok(self)
    }

    /// Sets values on every record, or on every match when the retrieval has not run.
    pub fn set(&mut self, values: Map<String, Value>) -> Result<&mut Self, AppError> {
        let values = self.prepare(values)?;
        for (name, value) in &values {
            if let Some(field) = self.schema.field(name) {
                validation::validate_value(&self.schema, field, value, false)?;
            }
        }
        if self.action == Action::Retrieve {
            self.pending.get_or_insert_with(Map::new).extend(values);
        } else {
            for record in &mut self.records {
                for (k, v) in &values {
                    record.set(k, v.clone());
                }
            }
        }
        Ok(self)
    }

    pub fn each(&mut self, action: Action) -> impl Iterator<Item = &mut Record> {
        self.records.iter_mut().filter(move |r| r.action == action)
    }

    /// Identity values of the held records.
    pub fn ids(&self) -> Vec<Value> {
        match &self.schema.id {
            Some(id) => self
                .records
                .iter()
                .map(|r| r.get(id).clone())
                .filter(|v| !v.is_null())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Criteria parsed into field paths, values in wire form.
    pub fn criteria_paths(&self) -> Vec<(FieldPath, Value)> {
        self.criteria
            .iter()
            .map(|(k, v)| (FieldPath::parse(k), v.to_wire()))
            .collect()
    }

    /// Criteria plus `like` in wire form.
    pub fn criteria_wire(&self) -> Map<String, Value> {
        let mut filter = encode_filter(&self.criteria);
        if let Some(like) = &self.like {
            filter.insert("like".into(), Value::String(like.clone()));
        }
        filter
    }

    /// Pending children of record `index` under the accessor `name`, created with it.
    pub fn child(&mut self, index: usize, name: &str) -> Result<&mut Model, AppError> {
        let relation = self
            .schema
            .child_relation(name)
            .cloned()
            .ok_or_else(|| self.error(format!("unknown child {}", name)))?;
        let missing = self.error(format!("no record {}", index));
        let repo = self.repo.clone();
        let record = self.records.get_mut(index).ok_or(missing)?;
        match record.children.entry(name.to_string()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let mode = match relation.kind {
                    RelationKind::OneToMany => Mode::Many,
                    RelationKind::OneToOne => Mode::One,
                };
                let mut child = repo.model(&relation.child, Action::Create, mode)?;
                child.optional = relation.kind == RelationKind::OneToOne;
                Ok(e.insert(child))
            }
        }
    }

    /// Retrieval of the stored children of record `index` under the accessor `name`.
    pub fn children(&self, index: usize, name: &str) -> Result<Model, AppError> {
        let relation = self
            .schema
            .child_relation(name)
            .ok_or_else(|| self.error(format!("unknown child {}", name)))?;
        let record = self
            .records
            .get(index)
            .ok_or_else(|| self.error(format!("no record {}", index)))?;
        let mode = match relation.kind {
            RelationKind::OneToMany => Mode::Many,
            RelationKind::OneToOne => Mode::One,
        };
        let mut child = self.repo.model(&relation.child, Action::Retrieve, mode)?;
        child.optional = relation.kind == RelationKind::OneToOne;
        Ok(child.filter(&relation.child_field, record.get(&relation.parent_field).clone()))
    }

    /// Retrieval of the parent of record `index` through the accessor `name`.
    pub fn parent(&self, index: usize, name: &str) -> Result<Model, AppError> {
        let Some(Link::Parent(relation)) = self.schema.link(name) else {
            return Err(self.error(format!("unknown parent {}", name)));
        };
        let record = self
            .records
            .get(index)
            .ok_or_else(|| self.error(format!("no record {}", index)))?;
        Ok(self
            .repo
            .one(&relation.parent)?
            .filter(&relation.parent_field, record.get(&relation.child_field).clone()))
    }

    /// Takes retrieved rows, enforcing the one/many cardinality rules.
    pub fn absorb(&mut self, rows: Vec<Map<String, Value>>, verify: bool) -> Result<bool, AppError> {
        if self.mode == Mode::One && rows.len() > 1 {
            return Err(self.error("more than one retrieved"));
        }
        if self.mode == Mode::One && rows.is_empty() && !self.optional {
            if verify {
                return Err(self.error("none retrieved"));
            }
            return Ok(false);
        }
        self.records = rows.into_iter().map(Record::persisted).collect();
        self.action = Action::Update;
        Ok(true)
    }

    pub async fn create(&mut self) -> Result<&mut Self, AppError> {
        validation::validate_create(self)?;
        let source = self.repo.source.clone();
        source.create(self).await?;
        Ok(self)
    }

    pub async fn retrieve(&mut self, verify: bool) -> Result<bool, AppError> {
        let source = self.repo.source.clone();
        source.retrieve(self, verify).await
    }

    pub async fn count(&mut self) -> Result<u64, AppError> {
        let source = self.repo.source.clone();
        source.count(self).await
    }

    pub async fn labels(&mut self) -> Result<Labels, AppError> {
        let source = self.repo.source.clone();
        source.labels(self).await
    }

    pub async fn update(&mut self) -> Result<u64, AppError> {
        let source = self.repo.source.clone();
        source.update(self).await
    }

    pub async fn delete(&mut self) -> Result<u64, AppError> {
        let source = self.repo.source.clone();
        source.delete(self).await
    }

    /// One record as an object (or null), many as a list.
    pub fn export(&self) -> Value {
        match self.mode {
            Mode::One => self
                .records
                .first()
                .map(|r| Value::Object(r.values().clone()))
                .unwrap_or(Value::Null),
            Mode::Many => Value::Array(
                self.records
                    .iter()
                    .map(|r| Value::Object(r.values().clone()))
                    .collect(),
            ),
        }
    }
}
