//! Wire decoding of criteria, sort, limit and count from a request, and the matching
//! JSON body encoding used by the remote source.

use crate::error::{AppError, CodecError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Query keys starting with this prefix carry pagination.
pub const LIMIT_PREFIX: &str = "limit";
pub const RESERVED: [&str; 2] = ["sort", "count"];
pub const CONFIRM_ALL: &str = "to confirm all, send a blank filter {}";

/// One decoded request: query pairs in arrival order and the JSON body object.
#[derive(Clone, Debug, Default)]
pub struct WireRequest {
    pub query: Vec<(String, String)>,
    pub body: Map<String, Value>,
}

impl WireRequest {
    pub fn new(query: Vec<(String, String)>, body: Map<String, Value>) -> Self {
        WireRequest { query, body }
    }

    pub fn from_body(body: Value) -> Self {
        WireRequest {
            query: Vec::new(),
            body: match body {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    /// First occurrence of a query key.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query
            .iter()
            .enumerate()
            .filter(|(i, (k, _))| !self.query[..*i].iter().any(|(p, _)| p == k))
            .map(|(_, (k, v))| (k.as_str(), v.as_str()))
    }

    /// Query args (minus pagination and reserved keys) overlaid with the body `filter`.
    /// With `verify`, an explicit filter is required before anything is returned.
    pub fn criteria(&self, verify: bool) -> Result<Map<String, Value>, AppError> {
        let mut criteria: Map<String, Value> = self
            .args()
            .filter(|(k, _)| !k.starts_with(LIMIT_PREFIX) && !RESERVED.contains(k))
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        let has_args = !self.query.is_empty();
        match self.body.get("filter") {
            Some(Value::Object(filter)) => {
                for (k, v) in filter {
                    criteria.insert(k.clone(), v.clone());
                }
            }
            Some(Value::Null) => {}
            None => {
                if verify && !has_args {
                    return Err(AppError::BadRequest(CONFIRM_ALL.into()));
                }
            }
            Some(other) => {
                return Err(CodecError::Malformed {
                    key: "filter",
                    message: format!("expected an object, got {}", other),
                }
                .into())
            }
        }
        Ok(criteria)
    }

    /// Query `sort` (comma separated) followed by the body `sort` list.
    pub fn sort(&self) -> Result<Vec<String>, AppError> {
        let mut sort: Vec<String> = self
            .arg("sort")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        match self.body.get("sort") {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in items {
                    match item {
                        Value::String(s) => sort.push(s.clone()),
                        other => {
                            return Err(CodecError::Malformed {
                                key: "sort",
                                message: format!("expected field names, got {}", other),
                            }
                            .into())
                        }
                    }
                }
            }
            Some(Value::String(s)) => sort.push(s.clone()),
            Some(other) => {
                return Err(CodecError::Malformed {
                    key: "sort",
                    message: format!("expected a list, got {}", other),
                }
                .into())
            }
        }
        Ok(sort)
    }

    /// Query keys starting with `limit` (the part after the last `__`) overlaid with body `limit`.
    pub fn limit(&self) -> Result<LimitSpec, AppError> {
        let mut limit = LimitSpec::default();
        for (key, value) in self.args().filter(|(k, _)| k.starts_with(LIMIT_PREFIX)) {
            let name = key.rsplit(super::SEPARATOR).next().unwrap_or(key);
            limit.insert(name, parse_int(name, value)?);
        }
        match self.body.get("limit") {
            None | Some(Value::Null) => {}
            Some(Value::Object(entries)) => {
                for (key, value) in entries {
                    let n = match value {
                        Value::Number(n) => n.as_i64().ok_or_else(|| CodecError::Malformed {
                            key: "limit",
                            message: format!("{} is not an integer", n),
                        })?,
                        Value::String(s) => parse_int(key, s)?,
                        other => parse_int(key, &other.to_string())?,
                    };
                    limit.insert(key, n);
                }
            }
            Some(other) => {
                return Err(CodecError::Malformed {
                    key: "limit",
                    message: format!("expected an object, got {}", other),
                }
                .into())
            }
        }
        Ok(limit)
    }

    /// Whether a count was asked for. The body value wins over the query.
    pub fn count(&self) -> bool {
        match self.body.get("count") {
            Some(Value::Null) | None => self.arg("count").map(truthy).unwrap_or(false),
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => truthy(s),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    /// Everything a retrieval needs in one value.
    pub fn query_spec(&self, verify: bool) -> Result<QuerySpec, AppError> {
        Ok(QuerySpec {
            criteria: self.criteria(verify)?,
            sort: self.sort()?,
            limit: self.limit()?,
            count: self.count(),
        })
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64, CodecError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|source| CodecError::InvalidLimit {
            key: key.to_string(),
            source,
            value: value.to_string(),
        })
}

/// `"0"`, `"no"` and `"false"` are false in any case; every other string is true.
pub fn truthy(value: &str) -> bool {
    !["0", "no", "false"].contains(&value.to_ascii_lowercase().as_str())
}

/// Pagination as received: any of `limit`, `per_page`, `page`, `start`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LimitSpec(BTreeMap<String, i64>);

impl LimitSpec {
    pub fn get(&self, key: &str) -> Option<i64> {
        self.0.get(key).copied()
    }

    pub fn insert(&mut self, key: &str, value: i64) {
        self.0.insert(key.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Normalizes to a concrete window. `limit` wins over `per_page`; `start` wins over `page`.
    pub fn page(&self, default_per_page: usize) -> Page {
        let size = self
            .get("limit")
            .or_else(|| self.get("per_page"))
            .map(|n| n.max(0) as usize)
            .unwrap_or(default_per_page);
        let offset = match (self.get("start"), self.get("page")) {
            (Some(start), _) => start.max(0) as usize,
            (None, Some(page)) => (page.max(1) as usize - 1).saturating_mul(size),
            (None, None) => 0,
        };
        // Offsets past the largest SQL bigint select nothing anyway.
        let offset = offset.min(i64::MAX as usize);
        Page {
            limit: Some(size),
            offset,
        }
    }
}

/// A concrete retrieval window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Page {
            limit: Some(limit),
            offset,
        }
    }
}

/// A decoded (or to-be-encoded) retrieval.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuerySpec {
    pub criteria: Map<String, Value>,
    pub sort: Vec<String>,
    pub limit: LimitSpec,
    pub count: bool,
}

impl QuerySpec {
    /// JSON body form. `filter` is always present; empty sort/limit and a false count are omitted.
    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("filter".into(), Value::Object(self.criteria.clone()));
        if !self.sort.is_empty() {
            body.insert("sort".into(), self.sort.iter().cloned().map(Value::String).collect());
        }
        if !self.limit.is_empty() {
            body.insert("limit".into(), serde_json::to_value(&self.limit).unwrap_or_default());
        }
        if self.count {
            body.insert("count".into(), Value::Bool(true));
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{encode_filter, Filter, FilterValue};
    use serde_json::json;

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn criteria_merge_query_and_body() {
        let wire = WireRequest::new(
            query(&[("a", "1"), ("a", "9"), ("limit", "5"), ("sort", "a"), ("count", "1")]),
            body(json!({"filter": {"b": 2}})),
        );
        assert_eq!(wire.criteria(false).unwrap(), body(json!({"a": "1", "b": 2})));

        let wire = WireRequest::new(query(&[("a", "1")]), body(json!({"filter": {"a": 2}})));
        assert_eq!(wire.criteria(false).unwrap(), body(json!({"a": 2})));
    }

    #[test]
    fn verify_requires_explicit_filter() {
        let err = WireRequest::default().criteria(true).unwrap_err();
        assert_eq!(err.to_string(), CONFIRM_ALL);

        let blank = WireRequest::from_body(json!({"filter": {}}));
        assert_eq!(blank.criteria(true).unwrap(), Map::new());
        let null = WireRequest::from_body(json!({"filter": null}));
        assert_eq!(null.criteria(true).unwrap(), Map::new());

        let args = WireRequest::new(query(&[("name", "x")]), Map::new());
        assert!(args.criteria(true).is_ok());
        assert!(WireRequest::default().criteria(false).unwrap().is_empty());
    }

    #[test]
    fn sort_appends_body_after_query() {
        let wire = WireRequest::new(query(&[("sort", "-a,b")]), body(json!({"sort": ["c"]})));
        assert_eq!(wire.sort().unwrap(), vec!["-a", "b", "c"]);
        assert!(WireRequest::default().sort().unwrap().is_empty());
    }

    #[test]
    fn limit_takes_suffix_after_separator() {
        let wire = WireRequest::new(
            query(&[("limit", "1")]),
            body(json!({"limit": {"per_page": "2", "page": 3}})),
        );
        let limit = wire.limit().unwrap();
        assert_eq!(limit.get("limit"), Some(1));
        assert_eq!(limit.get("per_page"), Some(2));
        assert_eq!(limit.get("page"), Some(3));

        let wire = WireRequest::new(query(&[("limit__start", "1"), ("limit__per_page", "1")]), Map::new());
        assert_eq!(wire.limit().unwrap().page(100), Page::new(1, 1));
    }

    #[test]
    fn bad_limit_is_a_codec_error() {
        let wire = WireRequest::new(query(&[("limit__per_page", "many")]), Map::new());
        assert!(matches!(
            wire.limit(),
            Err(AppError::Codec(CodecError::InvalidLimit { .. }))
        ));
    }

    #[test]
    fn count_truthiness() {
        let q = |v: &str| WireRequest::new(query(&[("count", v)]), Map::new()).count();
        assert!(!q("0"));
        assert!(!q("No"));
        assert!(!q("FALSE"));
        assert!(q("1"));
        assert!(q("yes"));
        assert!(q(""));
        assert!(!WireRequest::default().count());
        assert!(WireRequest::from_body(json!({"count": 2})).count());
        assert!(!WireRequest::from_body(json!({"count": 0})).count());
        assert!(!WireRequest::new(query(&[("count", "1")]), body(json!({"count": false}))).count());
    }

    #[test]
    fn page_normalization() {
        let mut spec = LimitSpec::default();
        assert_eq!(spec.page(100), Page::new(100, 0));
        spec.insert("per_page", 1);
        spec.insert("page", 3);
        assert_eq!(spec.page(100), Page::new(1, 2));
        spec.insert("limit", 5);
        assert_eq!(spec.page(100), Page::new(5, 10));
        spec.insert("start", 4);
        assert_eq!(spec.page(100), Page::new(5, 4));
    }

    #[test]
    fn huge_page_saturates() {
        let wire = WireRequest::new(
            query(&[("limit__per_page", "10"), ("limit__page", "9223372036854775807")]),
            Map::new(),
        );
        assert_eq!(wire.limit().unwrap().page(100), Page::new(10, i64::MAX as usize));

        let wire = WireRequest::from_body(json!({"limit": {"limit": i64::MAX, "page": i64::MAX}}));
        assert_eq!(
            wire.limit().unwrap().page(100),
            Page::new(i64::MAX as usize, i64::MAX as usize)
        );
    }

    #[test]
    fn encoded_criteria_decode_back() {
        let mut filter = Filter::new();
        filter.insert("name".into(), FilterValue::from("ya"));
        filter.insert(
            "id__in".into(),
            FilterValue::Set(vec![json!(3), json!(1), json!(2)]),
        );
        filter.insert("things__a__0".into(), FilterValue::from(json!({"b": 1})));
        let spec = QuerySpec {
            criteria: encode_filter(&filter),
            sort: vec!["-name".into(), "id".into()],
            limit: {
                let mut l = LimitSpec::default();
                l.insert("per_page", 10);
                l.insert("start", 20);
                l
            },
            count: false,
        };
        let body = spec.to_body();
        assert_eq!(body["filter"]["id__in"], json!([1, 2, 3]));
        assert!(body.get("count").is_none());

        let decoded = WireRequest::new(Vec::new(), body).query_spec(true).unwrap();
        assert_eq!(decoded, spec);
    }
}
