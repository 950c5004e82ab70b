//! PostgreSQL source: one table per model in a configurable schema.

use crate::config::{Catalog, FieldKind, ModelSchema};
use crate::error::AppError;
use crate::model::{create_children, update_children, Action, Model, Source};
use crate::sql::{PgBindValue, QueryBuf, SqlBuilder};
use crate::store::matcher::Row;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{ConnectOptions, PgPool, Postgres, Row as _};
use std::str::FromStr;

/// Schema holding the model tables. From env `RESTFUL_SCHEMA`, default `public`.
pub fn db_schema() -> String {
    std::env::var("RESTFUL_SCHEMA").unwrap_or_else(|_| "public".into())
}

pub struct PgSource {
    pool: PgPool,
    schema: String,
}

impl PgSource {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgSource {
            pool,
            schema: schema.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn builder<'a>(&'a self, catalog: &'a Catalog) -> SqlBuilder<'a> {
        SqlBuilder::new(catalog, &self.schema)
    }

    async fn fetch(&self, q: &QueryBuf, schema: &ModelSchema) -> Result<Vec<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind(sqlx::query(&q.sql), &q.params).fetch_all(&self.pool).await?;
        rows.iter().map(|row| decode(row, schema)).collect()
    }

    async fn scalar(&self, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind(sqlx::query(&q.sql), &q.params).fetch_one(&self.pool).await?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let done = bind(sqlx::query(&q.sql), &q.params).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }
}

fn bind<'q>(mut query: Query<'q, Postgres, PgArguments>, params: &[PgBindValue]) -> Query<'q, Postgres, PgArguments> {
    for p in params {
        query = query.bind(p.clone());
    }
    query
}

/// Column values back to JSON, read by the declared field kind.
fn decode(row: &PgRow, schema: &ModelSchema) -> Result<Row, AppError> {
    let mut out = Row::new();
    for field in &schema.fields {
        let name = field.name.as_str();
        let value = match field.kind {
            FieldKind::Int => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
            FieldKind::Float => row
                .try_get::<Option<f64>, _>(name)?
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            FieldKind::Bool => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
            FieldKind::Str => row.try_get::<Option<String>, _>(name)?.map(Value::String),
            FieldKind::Uuid => row
                .try_get::<Option<uuid::Uuid>, _>(name)?
                .map(|u| Value::String(u.to_string())),
            FieldKind::Datetime => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)?
                .map(|d| Value::String(d.to_rfc3339())),
            FieldKind::List | FieldKind::Dict | FieldKind::Set => row.try_get::<Option<Value>, _>(name)?,
        };
        out.insert(field.name.clone(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}

#[async_trait]
impl Source for PgSource {
    async fn create(&self, model: &mut Model) -> Result<(), AppError> {
        let schema = model.schema.clone();
        let repo = model.repository().clone();
        let catalog = repo.catalog();
        for record in model.records.iter_mut().filter(|r| r.action == Action::Create) {
            let q = self.builder(catalog).insert(&schema, record.values());
            tracing::debug!(sql = %q.sql, params = ?q.params, "query");
            let row = bind(sqlx::query(&q.sql), &q.params).fetch_optional(&self.pool).await?;
            if let (Some(row), Some(id)) = (row, schema.id_field()) {
                let created: Option<String> = row.try_get(0)?;
                if let Some(created) = created {
                    record.set(&id.name, id.kind.coerce(Value::String(created)));
                }
            }
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
        let q = self.builder(model.repository().catalog()).count(
            &model.schema,
            &model.criteria_paths(),
            model.like.as_deref(),
        )?;
        self.scalar(&q).await
    }

    async fn retrieve(&self, model: &mut Model, verify: bool) -> Result<bool, AppError> {
        let page = model.page;
        let sort = if model.sort.is_empty() {
            model.schema.sort.clone()
        } else {
            model.sort.clone()
        };
        let criteria = model.criteria_paths();
        // One extra row tells whether more matches exist past the limit.
        let q = self.builder(model.repository().catalog()).select(
            &model.schema,
            &criteria,
            model.like.as_deref(),
            &sort,
            page.limit.map(|l| l + 1),
            page.offset,
        )?;
        let mut rows = self.fetch(&q, &model.schema).await?;
        if let Some(limit) = page.limit {
            let overflow = if rows.len() > limit {
                rows.truncate(limit);
                true
            } else if rows.is_empty() && page.offset > 0 {
                self.count(model).await? > limit as u64
            } else {
                page.offset + rows.len() > limit
            };
            model.overflow = model.overflow || overflow;
        }
        model.absorb(rows, verify)
    }

    async fn update(&self, model: &mut Model) -> Result<u64, AppError> {
        let repo = model.repository().clone();
        let catalog = repo.catalog();
        if model.action == Action::Retrieve {
            let values = model.pending.clone().unwrap_or_default();
            if values.is_empty() {
                return self.count(model).await;
            }
            let q = self.builder(catalog).update(
                &model.schema,
                &values,
                &model.criteria_paths(),
                model.like.as_deref(),
            )?;
            return self.execute(&q).await;
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
        for record in model.each(Action::Update) {
            let by_id = [(crate::criteria::FieldPath::new(id.clone()), record.get(&id).clone())];
            let changed = record.changed();
            updated += if changed.is_empty() {
                self.scalar(&self.builder(catalog).count(&schema, &by_id, None)?).await?
            } else {
                self.execute(&self.builder(catalog).update(&schema, &changed, &by_id, None)?)
                    .await?
            };
            update_children(&schema, record).await?;
            record.persist();
        }
        Ok(updated)
    }

    async fn delete(&self, model: &mut Model) -> Result<u64, AppError> {
        let repo = model.repository().clone();
        let catalog = repo.catalog();
        if model.action == Action::Retrieve {
            let q = self.builder(catalog).delete(
                &model.schema,
                &model.criteria_paths(),
                model.like.as_deref(),
            )?;
            return self.execute(&q).await;
        }
        let Some(id) = model.schema.id.clone() else {
            return Err(model.error("nothing to delete from"));
        };
        let ids = model.ids();
        let by_id = [(
            crate::criteria::FieldPath::new(id).with_operator(crate::criteria::Operator::In),
            Value::Array(ids),
        )];
        let deleted = self
            .execute(&self.builder(catalog).delete(&model.schema, &by_id, None)?)
            .await?;
        for record in &mut model.records {
            record.forget();
        }
        model.action = Action::Create;
        Ok(deleted)
    }
}

/// Create the database named in `database_url` if it does not exist. Connects to the `postgres`
/// database on the same server to check and create.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", crate::sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_swaps_database() {
        let (admin, name) = parse_db_name_from_url("postgres://u:p@localhost:5432/things?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(name, "things");
    }
}
