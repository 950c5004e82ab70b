//! The contract every record store implements, and helpers shared by implementations.

use crate::config::ModelSchema;
use crate::error::AppError;
use crate::model::{validation, Action, Labels, Model, Record};
use async_trait::async_trait;

/// A pluggable backend for model operations.
///
/// `retrieve` returns whether anything was loaded; `update` and `delete` return affected counts.
#[async_trait]
pub trait Source: Send + Sync {
    /// Called once per schema when a repository binds this source.
    fn init(&self, schema: &mut ModelSchema) {
        mark_auto_id(schema);
    }

    async fn create(&self, model: &mut Model) -> Result<(), AppError>;

    async fn count(&self, model: &mut Model) -> Result<u64, AppError>;

    async fn retrieve(&self, model: &mut Model, verify: bool) -> Result<bool, AppError>;

    async fn labels(&self, model: &mut Model) -> Result<Labels, AppError> {
        if model.action == Action::Retrieve {
            self.retrieve(model, false).await?;
        }
        Labels::compose(model).await
    }

    async fn update(&self, model: &mut Model) -> Result<u64, AppError>;

    async fn delete(&self, model: &mut Model) -> Result<u64, AppError>;
}

/// Identity fields without an explicit `auto` are generated by the source.
pub fn mark_auto_id(schema: &mut ModelSchema) {
    if let Some(id) = schema.id.clone() {
        if let Some(field) = schema.field_mut(&id) {
            field.auto.get_or_insert(true);
        }
    }
}

/// Creates the pending children of a just-created record, pointing them at it.
pub async fn create_children(schema: &ModelSchema, record: &mut Record) -> Result<(), AppError> {
    for relation in &schema.children {
        let value = record.get(&relation.parent_field).clone();
        let Some(child) = record.children.get_mut(&relation.child_name) else {
            continue;
        };
        for r in child.each(Action::Create) {
            r.set(&relation.child_field, value.clone());
        }
        if child.records.iter().any(|r| r.action == Action::Create) {
            validation::validate_create(child)?;
            let source = child.repository().source().clone();
            source.create(child).await?;
        }
    }
    Ok(())
}

/// Creates new children of an updated record, then updates the ones already stored.
pub async fn update_children(schema: &ModelSchema, record: &mut Record) -> Result<(), AppError> {
    create_children(schema, record).await?;
    for child in record.children.values_mut() {
        let stored = child.schema.id.is_some()
            && child
                .records
                .iter()
                .any(|r| r.action == Action::Update && !r.changed().is_empty());
        if stored {
            let source = child.repository().source().clone();
            source.update(child).await?;
        }
    }
    Ok(())
}
