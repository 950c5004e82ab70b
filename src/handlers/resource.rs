//! Resource handlers: OPTIONS, GET, POST, PATCH and DELETE on `/{resource}` and
//! `/{resource}/{id}`.

use crate::config::FieldKind;
use crate::criteria::WireRequest;
use crate::error::AppError;
use crate::fields::{formats, labeling, ResourceDefinition};
use crate::model::Model;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

type Reply = Result<(StatusCode, Json<Value>), AppError>;

fn resource(state: &AppState, segment: &str) -> Result<Arc<ResourceDefinition>, AppError> {
    state.registry.resource(segment).cloned().ok_or(AppError::NoRoute)
}

fn parse_id(def: &ResourceDefinition, id_str: &str) -> Result<(String, Value), AppError> {
    let field = def.model.id_field().ok_or(AppError::NoRoute)?;
    let value = match field.kind {
        FieldKind::Int => {
            let n: i64 = id_str
                .parse()
                .map_err(|_| AppError::BadRequest("invalid id".into()))?;
            Value::Number(n.into())
        }
        FieldKind::Uuid => {
            let u = uuid::Uuid::parse_str(id_str).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
            Value::String(u.to_string())
        }
        kind => kind.coerce(Value::String(id_str.to_string())),
    };
    Ok((field.name.clone(), value))
}

/// The object under `key`, if the body has one.
fn object_at(body: &Map<String, Value>, key: &str) -> Result<Option<Map<String, Value>>, AppError> {
    match body.get(key) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(AppError::BadRequest(format!("{} must be an object", key))),
    }
}

fn either_required(def: &ResourceDefinition) -> AppError {
    AppError::BadRequest(format!("either {} or {} required", def.singular, def.plural))
}

fn one_by_id(state: &AppState, def: &ResourceDefinition, id_str: &str) -> Result<Model, AppError> {
    let (field, id) = parse_id(def, id_str)?;
    Ok(state.repo.one(&def.model.name)?.filter(&field, id))
}

async fn describe(
    state: &AppState,
    def: &ResourceDefinition,
    wire: &WireRequest,
    originals: Option<&Map<String, Value>>,
) -> Reply {
    let values = object_at(&wire.body, &def.singular)?;
    let likes = object_at(&wire.body, "likes")?.unwrap_or_default();
    let fields = labeling(def, &state.repo, &likes, values.as_ref(), originals).await?;
    Ok((StatusCode::OK, Json(json!({"fields": fields, "errors": []}))))
}

/// Form fields for a new record.
pub async fn options(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    wire: WireRequest,
) -> Reply {
    let def = resource(&state, &segment)?;
    describe(&state, &def, &wire, None).await
}

/// Form fields for an existing record, its stored values as originals.
pub async fn options_record(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
    wire: WireRequest,
) -> Reply {
    let def = resource(&state, &segment)?;
    let mut model = one_by_id(&state, &def, &id)?;
    model.retrieve(true).await?;
    let originals = model.records.first().map(|r| r.values().clone());
    describe(&state, &def, &wire, originals.as_ref()).await
}

async fn query(state: &AppState, def: &ResourceDefinition, wire: &WireRequest) -> Reply {
    let spec = wire.query_spec(false)?;
    let mut model = state
        .repo
        .many(&def.model.name)?
        .filters(&spec.criteria)
        .sort(spec.sort)
        .limit(spec.limit.page(def.model.per_page));
    if spec.count {
        let n = model.count().await?;
        return Ok((
            StatusCode::OK,
            Json(json!({ def.plural.clone(): n, "overflow": model.overflow })),
        ));
    }
    model.retrieve(false).await?;
    let formats = formats(def, &model).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            def.plural.clone(): model.export(),
            "overflow": model.overflow,
            "formats": formats,
        })),
    ))
}

/// Creates one record (singular key) or many (plural key). A `filter` makes it a query.
pub async fn create(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    wire: WireRequest,
) -> Reply {
    let def = resource(&state, &segment)?;
    if wire.body.contains_key("filter") {
        return query(&state, &def, &wire).await;
    }
    if let Some(values) = object_at(&wire.body, &def.singular)? {
        let mut model = state.repo.create(&def.model.name, values)?;
        model.create().await?;
        return Ok((
            StatusCode::CREATED,
            Json(json!({ def.singular.clone(): model.export() })),
        ));
    }
    if let Some(list) = wire.body.get(&def.plural) {
        let Value::Array(items) = list else {
            return Err(AppError::BadRequest(format!("{} must be a list", def.plural)));
        };
        let records = items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                _ => Err(AppError::BadRequest(format!("{} must be a list of objects", def.plural))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut model = state.repo.create_many(&def.model.name, records)?;
        model.create().await?;
        return Ok((
            StatusCode::CREATED,
            Json(json!({ def.plural.clone(): model.export() })),
        ));
    }
    Err(either_required(&def))
}

/// Lists matching records, or counts them.
pub async fn list(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    wire: WireRequest,
) -> Reply {
    let def = resource(&state, &segment)?;
    query(&state, &def, &wire).await
}

pub async fn read(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
) -> Reply {
    let def = resource(&state, &segment)?;
    let mut model = one_by_id(&state, &def, &id)?;
    model.retrieve(true).await?;
    let formats = formats(&def, &model).await?;
    Ok((
        StatusCode::OK,
        Json(json!({ def.singular.clone(): model.export(), "formats": formats })),
    ))
}

/// Updates every record matching an explicit filter.
pub async fn update(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    wire: WireRequest,
) -> Reply {
    let def = resource(&state, &segment)?;
    let one = object_at(&wire.body, &def.singular)?;
    let many = object_at(&wire.body, &def.plural)?;
    if one.is_none() && many.is_none() {
        return Err(either_required(&def));
    }
    let criteria = wire.criteria(true)?;
    let mut model = match (one, many) {
        (Some(values), _) => {
            let mut model = state.repo.one(&def.model.name)?.filters(&criteria);
            model.set(values)?;
            model
        }
        (None, Some(values)) => {
            let mut model = state.repo.many(&def.model.name)?.filters(&criteria);
            model.set(values)?;
            model
        }
        (None, None) => return Err(either_required(&def)),
    };
    let updated = model.update().await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "updated": updated }))))
}

pub async fn update_record(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
    wire: WireRequest,
) -> Reply {
    let def = resource(&state, &segment)?;
    if !wire.body.contains_key(&def.singular) && !wire.body.contains_key(&def.plural) {
        return Err(either_required(&def));
    }
    let values = object_at(&wire.body, &def.singular)?
        .ok_or_else(|| AppError::BadRequest(format!("{} required", def.singular)))?;
    let mut model = one_by_id(&state, &def, &id)?;
    model.set(values)?;
    let updated = model.update().await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "updated": updated }))))
}

/// Deletes every record matching an explicit filter.
pub async fn delete(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    wire: WireRequest,
) -> Reply {
    let def = resource(&state, &segment)?;
    let criteria = wire.criteria(true)?;
    let mut model = state.repo.many(&def.model.name)?.filters(&criteria);
    let deleted = model.delete().await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "deleted": deleted }))))
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path((segment, id)): Path<(String, String)>,
) -> Reply {
    let def = resource(&state, &segment)?;
    let mut model = one_by_id(&state, &def, &id)?;
    let deleted = model.delete().await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "deleted": deleted }))))
}
