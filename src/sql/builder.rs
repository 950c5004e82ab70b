//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for model tables.

use crate::config::{Catalog, FieldKind, Link, ModelSchema};
use crate::criteria::{FieldPath, Operator, Segment};
use crate::error::AppError;
use crate::sql::params::{array_literal, PgBindValue};
use crate::store::matcher::text;
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// Column type for a field kind.
pub fn pg_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Int => "bigint",
        FieldKind::Float => "double precision",
        FieldKind::Bool => "boolean",
        FieldKind::Str => "text",
        FieldKind::Uuid => "uuid",
        FieldKind::Datetime => "timestamptz",
        FieldKind::List | FieldKind::Dict | FieldKind::Set => "jsonb",
    }
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// `ILIKE`/`LIKE` operand with the pattern characters escaped.
fn pattern_text(v: &Value) -> String {
    text(v)
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn operand_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => crate::criteria::truthy(s),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Statements over the tables of one catalog in one database schema.
pub struct SqlBuilder<'a> {
    catalog: &'a Catalog,
    db_schema: &'a str,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(catalog: &'a Catalog, db_schema: &'a str) -> Self {
        SqlBuilder { catalog, db_schema }
    }

    fn table(&self, schema: &ModelSchema) -> String {
        qualified_table(self.db_schema, &schema.name)
    }

    fn columns(schema: &ModelSchema) -> String {
        schema
            .fields
            .iter()
            .map(|f| quoted(&f.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// SELECT every field of the matching rows. Sort keys are top-level fields only.
    pub fn select(
        &self,
        schema: &ModelSchema,
        criteria: &[(FieldPath, Value)],
        like: Option<&str>,
        sort: &[String],
        limit: Option<usize>,
        offset: usize,
    ) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let filter = self.where_clause(&mut q, schema, criteria, like)?;
        let mut order = Vec::new();
        for key in sort {
            let (name, dir) = match key.strip_prefix('-') {
                Some(name) => (name, "DESC"),
                None => (key.trim_start_matches('+'), "ASC"),
            };
            if schema.field(name).is_none() {
                return Err(AppError::model(schema.name.clone(), format!("cannot sort by {}", name)));
            }
            order.push(format!("{} {} NULLS FIRST", quoted(name), dir));
        }
        q.sql = format!("SELECT {} FROM {}{}", Self::columns(schema), self.table(schema), filter);
        if !order.is_empty() {
            q.sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        if let Some(limit) = limit {
            q.sql.push_str(&format!(" LIMIT {}", limit));
        }
        if offset > 0 {
            q.sql.push_str(&format!(" OFFSET {}", offset));
        }
        Ok(q)
    }

    pub fn count(
        &self,
        schema: &ModelSchema,
        criteria: &[(FieldPath, Value)],
        like: Option<&str>,
    ) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let filter = self.where_clause(&mut q, schema, criteria, like)?;
        q.sql = format!("SELECT COUNT(*) FROM {}{}", self.table(schema), filter);
        Ok(q)
    }

    /// INSERT one record. A null auto identity is left to the column default; the identity
    /// comes back as text.
    pub fn insert(&self, schema: &ModelSchema, values: &Map<String, Value>) -> QueryBuf {
        let mut q = QueryBuf::new();
        let mut cols = Vec::new();
        let mut placeholders = Vec::new();
        for field in &schema.fields {
            let value = values.get(&field.name).unwrap_or(&Value::Null);
            if field.is_auto() && value.is_null() {
                continue;
            }
            let n = q.push_param(PgBindValue::for_kind(field.kind, value));
            cols.push(quoted(&field.name));
            placeholders.push(format!("${}::{}", n, pg_type(field.kind)));
        }
        let returning = match &schema.id {
            Some(id) => format!(" RETURNING {}::text", quoted(id)),
            None => String::new(),
        };
        q.sql = if cols.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES{}", self.table(schema), returning)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}){}",
                self.table(schema),
                cols.join(", "),
                placeholders.join(", "),
                returning
            )
        };
        q
    }

    /// UPDATE the matching rows with `values`.
    pub fn update(
        &self,
        schema: &ModelSchema,
        values: &Map<String, Value>,
        criteria: &[(FieldPath, Value)],
        like: Option<&str>,
    ) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let mut sets = Vec::new();
        for (name, value) in values {
            let field = schema.field(name).ok_or_else(|| {
                AppError::model(schema.name.clone(), format!("unknown field {}", name))
            })?;
            let n = q.push_param(PgBindValue::for_kind(field.kind, value));
            sets.push(format!("{} = ${}::{}", quoted(name), n, pg_type(field.kind)));
        }
        let filter = self.where_clause(&mut q, schema, criteria, like)?;
        q.sql = format!("UPDATE {} SET {}{}", self.table(schema), sets.join(", "), filter);
        Ok(q)
    }

    pub fn delete(
        &self,
        schema: &ModelSchema,
        criteria: &[(FieldPath, Value)],
        like: Option<&str>,
    ) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let filter = self.where_clause(&mut q, schema, criteria, like)?;
        q.sql = format!("DELETE FROM {}{}", self.table(schema), filter);
        Ok(q)
    }

    fn where_clause(
        &self,
        q: &mut QueryBuf,
        schema: &ModelSchema,
        criteria: &[(FieldPath, Value)],
        like: Option<&str>,
    ) -> Result<String, AppError> {
        let conditions = self.conditions(q, schema, criteria, like)?;
        Ok(if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        })
    }

    fn conditions(
        &self,
        q: &mut QueryBuf,
        schema: &ModelSchema,
        criteria: &[(FieldPath, Value)],
        like: Option<&str>,
    ) -> Result<Vec<String>, AppError> {
        let mut out = Vec::new();
        for (path, value) in criteria {
            out.push(self.condition(q, schema, path, value)?);
        }
        if let Some(term) = like {
            out.push(self.like_condition(q, schema, term)?);
        }
        Ok(out)
    }

    fn condition(
        &self,
        q: &mut QueryBuf,
        schema: &ModelSchema,
        path: &FieldPath,
        value: &Value,
    ) -> Result<String, AppError> {
        let Some(field) = schema.field(&path.field) else {
            return self.linked_condition(q, schema, path, value);
        };
        let column = quoted(&field.name);
        // Nested values are compared as text; top-level ones as the column type.
        let (expr, cast) = if path.path.is_empty() {
            (column, pg_type(field.kind).to_string())
        } else {
            let segments = path.path.iter().map(|s| {
                PgBindValue::Text(match s {
                    Segment::Key(k) => k.clone(),
                    Segment::Index(i) => i.to_string(),
                })
            });
            let n = q.push_param(array_literal(segments));
            (format!("({} #>> ${}::text[])", column, n), "text".to_string())
        };
        let kind = if path.path.is_empty() {
            field.kind
        } else {
            FieldKind::Str
        };
        let bind = |q: &mut QueryBuf, v: &Value| -> String {
            let n = q.push_param(PgBindValue::for_kind(kind, v));
            format!("${}::{}", n, cast)
        };

        Ok(match path.operator {
            None if value.is_null() => format!("{} IS NULL", expr),
            None => format!("{} = {}", expr, bind(q, value)),
            Some(Operator::Ne) if value.is_null() => format!("{} IS NOT NULL", expr),
            Some(Operator::Ne) => format!("{} IS DISTINCT FROM {}", expr, bind(q, value)),
            Some(Operator::In) => {
                let items: Vec<Value> = match value {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                if items.is_empty() {
                    "FALSE".to_string()
                } else {
                    let n = q.push_param(array_literal(
                        items.iter().map(|v| PgBindValue::for_kind(kind, v)),
                    ));
                    format!("{} = ANY(${}::{}[])", expr, n, cast)
                }
            }
            Some(Operator::Like) => {
                let n = q.push_param(PgBindValue::Text(pattern_text(value)));
                format!("{}::text ILIKE '%' || ${} || '%'", expr, n)
            }
            Some(Operator::NotLike) => {
                let n = q.push_param(PgBindValue::Text(pattern_text(value)));
                format!("({0} IS NULL OR {0}::text NOT ILIKE '%' || ${1} || '%')", expr, n)
            }
            Some(Operator::Null) if operand_truthy(value) => format!("{} IS NULL", expr),
            Some(Operator::Null) => format!("{} IS NOT NULL", expr),
            Some(op @ (Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte)) => {
                let symbol = match op {
                    Operator::Gt => ">",
                    Operator::Gte => ">=",
                    Operator::Lt => "<",
                    _ => "<=",
                };
                if !path.path.is_empty() && value.is_number() {
                    let n = q.push_param(PgBindValue::text(value));
                    format!("({})::numeric {} ${}::numeric", expr, symbol, n)
                } else {
                    format!("{} {} {}", expr, symbol, bind(q, value))
                }
            }
            Some(Operator::Start) => {
                let n = q.push_param(PgBindValue::Text(pattern_text(value)));
                format!("{}::text LIKE ${} || '%'", expr, n)
            }
            Some(Operator::End) => {
                let n = q.push_param(PgBindValue::Text(pattern_text(value)));
                format!("{}::text LIKE '%' || ${}", expr, n)
            }
        })
    }

    /// `relation__field` criteria become a sub-select on the related table.
    fn linked_condition(
        &self,
        q: &mut QueryBuf,
        schema: &ModelSchema,
        path: &FieldPath,
        value: &Value,
    ) -> Result<String, AppError> {
        let unknown = || AppError::model(schema.name.clone(), format!("unknown criterion {}", path));
        let link: Link<'_> = schema.link(&path.field).ok_or_else(unknown)?;
        let rest = path.descend().ok_or_else(unknown)?;
        let target = self.catalog.require(link.target())?;
        let (ours, theirs) = link.keys();
        let inner = self.condition(q, &target, &rest, value)?;
        Ok(format!(
            "{} IN (SELECT {} FROM {} WHERE {})",
            quoted(ours),
            quoted(theirs),
            self.table(&target),
            inner
        ))
    }

    /// Free-text search over the label fields, through parent labels where a label is a reference.
    fn like_condition(&self, q: &mut QueryBuf, schema: &ModelSchema, term: &str) -> Result<String, AppError> {
        let mut any = Vec::new();
        for field in &schema.label {
            match schema.ancestor(field) {
                Some(relation) => {
                    let parent = self.catalog.require(&relation.parent)?;
                    let inner = self.like_condition(q, &parent, term)?;
                    any.push(format!(
                        "{} IN (SELECT {} FROM {} WHERE {})",
                        quoted(field),
                        quoted(&relation.parent_field),
                        self.table(&parent),
                        inner
                    ));
                }
                None => {
                    let path = FieldPath::parse(field).with_operator(Operator::Like);
                    any.push(self.condition(q, schema, &path, &Value::String(term.to_string()))?);
                }
            }
        }
        Ok(if any.is_empty() {
            "FALSE".to_string()
        } else {
            format!("({})", any.join(" OR "))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use serde_json::json;

    fn catalog() -> Catalog {
        let config: FullConfig = serde_json::from_value(json!({
            "models": [
                {"name": "unit", "fields": [{"name": "id", "kind": "int", "auto": true}, {"name": "name"}]},
                {"name": "test", "label": ["unit_id", "name"], "fields": [
                    {"name": "id", "kind": "int", "auto": true},
                    {"name": "unit_id", "kind": "int"},
                    {"name": "name"},
                    {"name": "things", "kind": "dict"}
                ]}
            ],
            "relations": [{"parent": "unit", "child": "test"}]
        }))
        .unwrap();
        resolve(&config).unwrap()
    }

    fn crit(pairs: &[(&str, Value)]) -> Vec<(FieldPath, Value)> {
        pairs.iter().map(|(k, v)| (FieldPath::parse(k), v.clone())).collect()
    }

    #[test]
    fn select_with_operators_sort_and_window() {
        let catalog = catalog();
        let b = SqlBuilder::new(&catalog, "public");
        let test = catalog.model("test").unwrap();
        let q = b
            .select(
                test,
                &crit(&[("name__ne", json!("x")), ("id__in", json!([1, 2]))]),
                None,
                &["-name".into()],
                Some(11),
                20,
            )
            .unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"unit_id\", \"name\", \"things\" FROM \"public\".\"test\" \
             WHERE \"name\" IS DISTINCT FROM $1::text AND \"id\" = ANY($2::bigint[]) \
             ORDER BY \"name\" DESC NULLS FIRST LIMIT 11 OFFSET 20"
        );
        assert_eq!(
            q.params,
            vec![PgBindValue::Text("x".into()), PgBindValue::Text("{\"1\",\"2\"}".into())]
        );
    }

    #[test]
    fn nested_paths_and_relations() {
        let catalog = catalog();
        let b = SqlBuilder::new(&catalog, "public");
        let unit = catalog.model("unit").unwrap();
        let test = catalog.model("test").unwrap();

        let q = b.count(test, &crit(&[("things__a__0__gt", json!(1))]), None).unwrap();
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"public\".\"test\" WHERE ((\"things\" #>> $1::text[]))::numeric > $2::numeric"
        );

        let q = b.count(unit, &crit(&[("test__name", json!("moar"))]), None).unwrap();
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"public\".\"unit\" WHERE \"id\" IN \
             (SELECT \"unit_id\" FROM \"public\".\"test\" WHERE \"name\" = $1::text)"
        );
    }

    #[test]
    fn like_reaches_parent_labels() {
        let catalog = catalog();
        let b = SqlBuilder::new(&catalog, "public");
        let test = catalog.model("test").unwrap();
        let q = b.count(test, &[], Some("pe_")).unwrap();
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"public\".\"test\" WHERE (\"unit_id\" IN (SELECT \"id\" FROM \"public\".\"unit\" \
             WHERE (\"name\"::text ILIKE '%' || $1 || '%')) OR \"name\"::text ILIKE '%' || $2 || '%')"
        );
        assert_eq!(q.params[0], PgBindValue::Text("pe\\_".into()));
    }

    #[test]
    fn insert_skips_null_auto_identity() {
        let catalog = catalog();
        let b = SqlBuilder::new(&catalog, "public");
        let unit = catalog.model("unit").unwrap();
        let q = b.insert(unit, json!({"id": null, "name": "people"}).as_object().unwrap());
        assert_eq!(
            q.sql,
            "INSERT INTO \"public\".\"unit\" (\"name\") VALUES ($1::text) RETURNING \"id\"::text"
        );
    }

    #[test]
    fn update_and_delete() {
        let catalog = catalog();
        let b = SqlBuilder::new(&catalog, "public");
        let unit = catalog.model("unit").unwrap();
        let values = json!({"name": "stuff"});
        let q = b
            .update(unit, values.as_object().unwrap(), &crit(&[("id", json!(1))]), None)
            .unwrap();
        assert_eq!(q.sql, "UPDATE \"public\".\"unit\" SET \"name\" = $1::text WHERE \"id\" = $2::bigint");

        let q = b.delete(unit, &crit(&[("name__null", json!(true))]), None).unwrap();
        assert_eq!(q.sql, "DELETE FROM \"public\".\"unit\" WHERE \"name\" IS NULL");
        assert!(q.params.is_empty());
    }
}
