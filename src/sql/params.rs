//! Convert serde_json::Value to parameters sqlx can bind. Every value travels as text and the
//! statement casts it to the column type.

use crate::config::FieldKind;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Text(String),
}

impl PgBindValue {
    /// Text form of a value bound for a column of `kind`. Container kinds are sent as JSON.
    pub fn for_kind(kind: FieldKind, v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            _ if kind.is_container() => PgBindValue::Text(v.to_string()),
            other => Self::text(other),
        }
    }

    /// Plain text form: strings as-is, everything else as JSON.
    pub fn text(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::String(s) => PgBindValue::Text(s.clone()),
            other => PgBindValue::Text(other.to_string()),
        }
    }
}

/// PostgreSQL array literal (`{"a","b"}`), elements quoted.
pub fn array_literal<I: IntoIterator<Item = PgBindValue>>(items: I) -> PgBindValue {
    let body = items
        .into_iter()
        .map(|item| match item {
            PgBindValue::Null => "NULL".to_string(),
            PgBindValue::Text(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        })
        .collect::<Vec<_>>()
        .join(",");
    PgBindValue::Text(format!("{{{}}}", body))
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            PgBindValue::Null => Ok(IsNull::Yes),
            PgBindValue::Text(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)
            }
        }
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
