//! Criteria evaluation over JSON rows, for sources that keep records in memory.

use crate::config::{Catalog, ModelSchema};
use crate::criteria::{compare_values, truthy, values_equal, FieldPath, Operator};
use crate::error::AppError;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

pub type Row = Map<String, Value>;
pub type Rows = HashMap<String, Vec<Row>>;

/// Stringified form used by `like`, `start` and `end`.
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Brings a query-string operand to the type of the stored value when it parses.
fn align(actual: &Value, expected: &Value) -> Value {
    match (actual, expected) {
        (Value::Number(_), Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| s.trim().parse::<f64>().map(Value::from))
            .unwrap_or_else(|_| expected.clone()),
        (Value::Bool(_), Value::String(s)) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
        (Value::Bool(_), Value::String(s)) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
        _ => expected.clone(),
    }
}

fn is_null(actual: Option<&Value>) -> bool {
    actual.map_or(true, Value::is_null)
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None | Some(Value::Null) => expected.is_null(),
        Some(a) => values_equal(a, &align(a, expected)),
    }
}

fn ordered(actual: Option<&Value>, expected: &Value, accept: fn(Ordering) -> bool) -> bool {
    match actual {
        None | Some(Value::Null) => false,
        Some(a) => {
            let e = align(a, expected);
            let comparable = matches!(
                (a, &e),
                (Value::Number(_), Value::Number(_))
                    | (Value::String(_), Value::String(_))
                    | (Value::Bool(_), Value::Bool(_))
            );
            comparable && accept(compare_values(a, &e))
        }
    }
}

fn operand_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => truthy(s),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Applies one operator to the addressed value.
pub fn evaluate(actual: Option<&Value>, operator: Option<Operator>, expected: &Value) -> bool {
    match operator {
        None => equals(actual, expected),
        Some(Operator::In) => match expected {
            Value::Array(items) => items.iter().any(|e| equals(actual, e)),
            other => equals(actual, other),
        },
        Some(Operator::Ne) => !equals(actual, expected),
        Some(Operator::Like) => actual
            .filter(|a| !a.is_null())
            .is_some_and(|a| contains_ci(&text(a), &text(expected))),
        Some(Operator::NotLike) => !evaluate(actual, Some(Operator::Like), expected),
        Some(Operator::Null) => is_null(actual) == operand_truthy(expected),
        Some(Operator::Gt) => ordered(actual, expected, Ordering::is_gt),
        Some(Operator::Gte) => ordered(actual, expected, Ordering::is_ge),
        Some(Operator::Lt) => ordered(actual, expected, Ordering::is_lt),
        Some(Operator::Lte) => ordered(actual, expected, Ordering::is_le),
        Some(Operator::Start) => actual
            .filter(|a| !a.is_null())
            .is_some_and(|a| text(a).starts_with(&text(expected))),
        Some(Operator::End) => actual
            .filter(|a| !a.is_null())
            .is_some_and(|a| text(a).ends_with(&text(expected))),
    }
}

/// Stable sort by `name`, `+name` or `-name` keys, first key most significant.
pub fn sort_rows(rows: &mut [Row], sort: &[String]) {
    let keys: Vec<(FieldPath, bool)> = sort
        .iter()
        .map(|s| match s.strip_prefix('-') {
            Some(name) => (FieldPath::parse(name), true),
            None => (FieldPath::parse(s.trim_start_matches('+')), false),
        })
        .collect();
    rows.sort_by(|a, b| {
        keys.iter()
            .map(|(path, desc)| {
                let x = path.lookup(a).unwrap_or(&Value::Null);
                let y = path.lookup(b).unwrap_or(&Value::Null);
                let o = compare_values(x, y);
                if *desc {
                    o.reverse()
                } else {
                    o
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

/// Evaluates criteria against stored rows, following relations through the catalog.
pub struct Matcher<'a> {
    catalog: &'a Catalog,
    rows: &'a Rows,
}

impl<'a> Matcher<'a> {
    pub fn new(catalog: &'a Catalog, rows: &'a Rows) -> Self {
        Matcher { catalog, rows }
    }

    fn table(&self, model: &str) -> &'a [Row] {
        self.rows.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Positions of the rows of `schema` matching every criterion and the `like` term.
    pub fn indices(
        &self,
        schema: &ModelSchema,
        criteria: &[(FieldPath, Value)],
        like: Option<&str>,
    ) -> Result<Vec<usize>, AppError> {
        let mut found = Vec::new();
        for (i, row) in self.table(&schema.name).iter().enumerate() {
            if self.matches(schema, row, criteria, like)? {
                found.push(i);
            }
        }
        Ok(found)
    }

    pub fn select(
        &self,
        schema: &ModelSchema,
        criteria: &[(FieldPath, Value)],
        like: Option<&str>,
    ) -> Result<Vec<&'a Row>, AppError> {
        let table = self.table(&schema.name);
        Ok(self
            .indices(schema, criteria, like)?
            .into_iter()
            .map(|i| &table[i])
            .collect())
    }

    fn matches(
        &self,
        schema: &ModelSchema,
        row: &Row,
        criteria: &[(FieldPath, Value)],
        like: Option<&str>,
    ) -> Result<bool, AppError> {
        for (path, expected) in criteria {
            if !self.criterion(schema, row, path, expected)? {
                return Ok(false);
            }
        }
        match like {
            Some(term) => self.like(schema, row, term),
            None => Ok(true),
        }
    }

    fn criterion(
        &self,
        schema: &ModelSchema,
        row: &Row,
        path: &FieldPath,
        expected: &Value,
    ) -> Result<bool, AppError> {
        if schema.field(&path.field).is_some() {
            return Ok(evaluate(path.lookup(row), path.operator, expected));
        }
        let unknown = || AppError::model(schema.name.clone(), format!("unknown criterion {}", path));
        let link = schema.link(&path.field).ok_or_else(unknown)?;
        let rest = path.descend().ok_or_else(unknown)?;
        let target = self.catalog.require(link.target())?;
        let (ours, theirs) = link.keys();
        let related = self.select(&target, &[(rest, expected.clone())], None)?;
        let own = row.get(ours).unwrap_or(&Value::Null);
        Ok(!own.is_null()
            && related
                .iter()
                .any(|r| r.get(theirs).is_some_and(|v| values_equal(v, own))))
    }

    /// Free-text match over the label fields; parent references match on the parent's labels.
    fn like(&self, schema: &ModelSchema, row: &Row, term: &str) -> Result<bool, AppError> {
        for field in &schema.label {
            let matched = match schema.ancestor(field) {
                Some(relation) => {
                    let parent = self.catalog.require(&relation.parent)?;
                    let own = row.get(field).unwrap_or(&Value::Null);
                    !own.is_null()
                        && self
                            .select(&parent, &[], Some(term))?
                            .iter()
                            .any(|p| p.get(&relation.parent_field).is_some_and(|v| values_equal(v, own)))
                }
                None => FieldPath::parse(field)
                    .lookup(row)
                    .is_some_and(|v| !v.is_null() && contains_ci(&text(v), term)),
            };
            if matched {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
