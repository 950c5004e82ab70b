//! Value checks applied before records reach a source.

use crate::config::{FieldSchema, ModelSchema};
use crate::criteria::values_equal;
use crate::error::AppError;
use crate::model::{Action, Model};
use regex::Regex;
use serde_json::Value;

/// Checks every record about to be created.
pub fn validate_create(model: &Model) -> Result<(), AppError> {
    for record in model.records.iter().filter(|r| r.action == Action::Create) {
        for field in &model.schema.fields {
            validate_value(&model.schema, field, record.get(&field.name), true)?;
        }
    }
    Ok(())
}

/// Checks one value against its field. Nulls only fail when creating a required field.
pub fn validate_value(
    schema: &ModelSchema,
    field: &FieldSchema,
    value: &Value,
    creating: bool,
) -> Result<(), AppError> {
    let fail = |message: String| Err(AppError::model(schema.name.clone(), message));
    if value.is_null() {
        if creating && !field.none && !field.is_auto() {
            return fail(format!("{} required", field.name));
        }
        return Ok(());
    }
    if !field.kind.accepts(value) {
        return fail(format!("invalid {} for {}: {}", field.kind.as_str(), field.name, value));
    }
    if !field.options.is_empty() && !field.options.iter().any(|o| values_equal(o, value)) {
        return fail(format!("{} not in {} options", value, field.name));
    }
    if let (Some(Value::String(pattern)), Some(s)) = (&field.validation, value.as_str()) {
        let re = Regex::new(pattern).map_err(|e| {
            AppError::model(schema.name.clone(), format!("invalid validation for {}: {}", field.name, e))
        })?;
        if !re.is_match(s) {
            return fail(format!("{} does not match {}", field.name, pattern));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldKind;
    use serde_json::json;

    fn schema() -> ModelSchema {
        ModelSchema {
            name: "simple".into(),
            singular: None,
            plural: None,
            endpoint: None,
            id: Some("id".into()),
            fields: vec![],
            label: vec![],
            list: vec![],
            sort: vec![],
            per_page: 100,
            parents: vec![],
            children: vec![],
        }
    }

    #[test]
    fn required_only_when_creating() {
        let schema = schema();
        let name = FieldSchema::new("name", FieldKind::Str);
        let err = validate_value(&schema, &name, &Value::Null, true).unwrap_err();
        assert_eq!(err.to_string(), "simple: name required");
        assert!(validate_value(&schema, &name, &Value::Null, false).is_ok());

        let mut id = FieldSchema::new("id", FieldKind::Int);
        id.auto = Some(true);
        assert!(validate_value(&schema, &id, &Value::Null, true).is_ok());
    }

    #[test]
    fn kind_options_and_pattern() {
        let schema = schema();
        let mut status = FieldSchema::new("status", FieldKind::Str);
        status.options = vec![json!("good"), json!("bad")];
        assert!(validate_value(&schema, &status, &json!("good"), true).is_ok());
        assert!(validate_value(&schema, &status, &json!("ugly"), true).is_err());
        assert!(validate_value(&schema, &status, &json!(1), true).is_err());

        let mut code = FieldSchema::new("code", FieldKind::Str);
        code.validation = Some(json!("^[a-z]+$"));
        assert!(validate_value(&schema, &code, &json!("abc"), true).is_ok());
        let err = validate_value(&schema, &code, &json!("ABC"), true).unwrap_err();
        assert_eq!(err.to_string(), "simple: code does not match ^[a-z]+$");
    }
}
