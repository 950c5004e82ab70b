//! Apply a catalog to the database: schema, one table per model, foreign keys for relations.

use crate::config::{Catalog, ModelSchema, Relation};
use crate::error::AppError;
use crate::sql::{pg_type, qualified_table, quoted};
use sqlx::PgPool;

/// CREATE TABLE for one model. Generated int identities are BIGSERIAL, uuid ones default to
/// `gen_random_uuid()`.
pub fn table_ddl(schema: &ModelSchema, db_schema: &str) -> String {
    let mut col_defs: Vec<String> = Vec::new();
    for field in &schema.fields {
        let is_id = schema.id.as_deref() == Some(field.name.as_str());
        let typ = match field.kind {
            crate::config::FieldKind::Int if is_id && field.is_auto() => "BIGSERIAL",
            kind => pg_type(kind),
        };
        let mut def = format!("{} {}", quoted(&field.name), typ);
        if is_id {
            def.push_str(" PRIMARY KEY");
            if field.is_auto() && field.kind == crate::config::FieldKind::Uuid {
                def.push_str(" DEFAULT gen_random_uuid()");
            }
        } else if !field.none && !field.is_auto() {
            def.push_str(" NOT NULL");
        }
        col_defs.push(def);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(db_schema, &schema.name),
        col_defs.join(",\n  ")
    )
}

fn foreign_key_ddl(relation: &Relation, db_schema: &str) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
        qualified_table(db_schema, &relation.child),
        quoted(&format!("{}_{}_fkey", relation.child, relation.child_field)),
        quoted(&relation.child_field),
        qualified_table(db_schema, &relation.parent),
        quoted(&relation.parent_field),
    )
}

/// Idempotent: tables are created if missing; foreign keys that already exist are skipped.
pub async fn apply_migrations(pool: &PgPool, catalog: &Catalog, db_schema: &str) -> Result<(), AppError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(db_schema)))
        .execute(pool)
        .await?;
    for schema in &catalog.models {
        sqlx::query(&table_ddl(schema, db_schema)).execute(pool).await?;
    }
    for schema in &catalog.models {
        for relation in &schema.children {
            let sql = foreign_key_ddl(relation, db_schema);
            if let Err(e) = sqlx::query(&sql).execute(pool).await {
                tracing::debug!(error = %e, child = %relation.child, "foreign key not added");
            }
        }
    }
    tracing::info!(models = catalog.models.len(), schema = %db_schema, "migrations applied");
    Ok(())
}
