//! Field paths: `things__a__0__in` style keys addressing nested values with an optional operator.

use serde_json::{Map, Value};
use std::fmt;

pub const SEPARATOR: &str = "__";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    In,
    Ne,
    Like,
    NotLike,
    Null,
    Gt,
    Gte,
    Lt,
    Lte,
    Start,
    End,
}

impl Operator {
    pub const ALL: [Operator; 11] = [
        Operator::In,
        Operator::Ne,
        Operator::Like,
        Operator::NotLike,
        Operator::Null,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Start,
        Operator::End,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::In => "in",
            Operator::Ne => "ne",
            Operator::Like => "like",
            Operator::NotLike => "notlike",
            Operator::Null => "null",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Start => "start",
            Operator::End => "end",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == s)
    }

    /// Operators whose operand is not a value of the field's kind.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Operator::Like | Operator::NotLike | Operator::Null | Operator::Start | Operator::End
        )
    }
}

/// One step into a stored value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(i64),
}

impl Segment {
    fn parse(s: &str) -> Self {
        if let Some(key) = s.strip_prefix('_') {
            return Segment::Key(key.to_string());
        }
        match s.parse::<i64>() {
            Ok(i) => Segment::Index(i),
            Err(_) => Segment::Key(s.to_string()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Index(i) => write!(f, "{}", i),
            Segment::Key(k) if k.starts_with('_') || k.parse::<i64>().is_ok() => write!(f, "_{}", k),
            Segment::Key(k) => f.write_str(k),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub field: String,
    pub path: Vec<Segment>,
    pub operator: Option<Operator>,
}

impl FieldPath {
    pub fn new(field: impl Into<String>) -> Self {
        FieldPath {
            field: field.into(),
            path: Vec::new(),
            operator: None,
        }
    }

    /// Splits on `__`. A trailing operator name is only an operator when it follows a field.
    pub fn parse(key: &str) -> Self {
        let mut parts: Vec<&str> = key.split(SEPARATOR).collect();
        let operator = if parts.len() > 1 {
            parts.last().and_then(|last| Operator::parse(last))
        } else {
            None
        };
        if operator.is_some() {
            parts.pop();
        }
        let field = parts.first().copied().unwrap_or_default().to_string();
        FieldPath {
            field,
            path: parts.iter().skip(1).map(|s| Segment::parse(s)).collect(),
            operator,
        }
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    /// The path with its first segment promoted to the field, for descending through a relation.
    pub fn descend(&self) -> Option<FieldPath> {
        let (first, rest) = self.path.split_first()?;
        Some(FieldPath {
            field: match first {
                Segment::Key(k) => k.clone(),
                Segment::Index(i) => i.to_string(),
            },
            path: rest.to_vec(),
            operator: self.operator,
        })
    }
}

impl FieldPath {
    /// The value this path addresses inside a record, if any.
    pub fn lookup<'a>(&self, values: &'a Map<String, Value>) -> Option<&'a Value> {
        let mut current = values.get(&self.field)?;
        for segment in &self.path {
            current = match (segment, current) {
                (Segment::Key(k), Value::Object(m)) => m.get(k)?,
                (Segment::Index(i), Value::Object(m)) => m.get(&i.to_string())?,
                (Segment::Index(i), Value::Array(items)) => {
                    let at = if *i < 0 { items.len() as i64 + i } else { *i };
                    items.get(usize::try_from(at).ok()?)?
                }
                _ => return None,
            };
        }
        Some(current)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field)?;
        for segment in &self.path {
            write!(f, "{}{}", SEPARATOR, segment)?;
        }
        if let Some(op) = self.operator {
            write!(f, "{}{}", SEPARATOR, op.as_str())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_paths_with_operators() {
        let p = FieldPath::parse("things__a__b__0__in");
        assert_eq!(p.field, "things");
        assert_eq!(
            p.path,
            vec![Segment::Key("a".into()), Segment::Key("b".into()), Segment::Index(0)]
        );
        assert_eq!(p.operator, Some(Operator::In));
    }

    #[test]
    fn underscore_prefix_is_a_literal_key() {
        let p = FieldPath::parse("things___4");
        assert_eq!(p.path, vec![Segment::Key("4".into())]);
        assert_eq!(p.to_string(), "things___4");
        assert_eq!(FieldPath::parse("things__-1").path, vec![Segment::Index(-1)]);
    }

    #[test]
    fn bare_operator_name_is_a_field() {
        let p = FieldPath::parse("like");
        assert_eq!(p.field, "like");
        assert_eq!(p.operator, None);
        assert_eq!(FieldPath::parse("simple_id__notlike").operator, Some(Operator::NotLike));
    }

    #[test]
    fn display_round_trips() {
        for key in ["name", "name__ne", "ip__address__start", "things__a__1__null"] {
            assert_eq!(FieldPath::parse(key).to_string(), key);
        }
    }

    #[test]
    fn looks_up_nested_values() {
        let record = serde_json::json!({"things": {"a": {"b": [1, 2, 3]}, "4": "four"}});
        let record = record.as_object().unwrap();
        let at = |key: &str| FieldPath::parse(key).lookup(record).cloned();
        assert_eq!(at("things__a__b__0"), Some(serde_json::json!(1)));
        assert_eq!(at("things__a__b__-1"), Some(serde_json::json!(3)));
        assert_eq!(at("things___4"), Some(serde_json::json!("four")));
        assert_eq!(at("things__4"), Some(serde_json::json!("four")));
        assert_eq!(at("things__z"), None);
        assert_eq!(at("things__a__b__7"), None);
    }

    #[test]
    fn descends_into_relations() {
        let p = FieldPath::parse("test__name__like").descend().unwrap();
        assert_eq!(p.to_string(), "name__like");
        assert!(FieldPath::parse("name").descend().is_none());
    }
}
