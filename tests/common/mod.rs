#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use restful_models::{AppState, FullConfig, MemorySource, Repository};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Widgets belong to a kind; gadgets have no identity.
pub fn config() -> FullConfig {
    serde_json::from_value(json!({
        "models": [
            {"name": "kind", "per_page": 2, "fields": [
                {"name": "id", "kind": "int"},
                {"name": "name"}
            ]},
            {"name": "widget", "fields": [
                {"name": "id", "kind": "int"},
                {"name": "kind_id", "kind": "int", "none": true},
                {"name": "name"},
                {"name": "status", "default": "good"},
                {"name": "meta", "kind": "dict", "none": true}
            ]},
            {"name": "gadget", "id": null, "fields": [
                {"name": "name"}
            ]}
        ],
        "relations": [{"parent": "kind", "child": "widget"}]
    }))
    .expect("test config")
}

pub fn repository() -> Repository {
    Repository::from_config(&config(), Arc::new(MemorySource::new())).expect("repository")
}

pub fn router(repo: Repository) -> Router {
    restful_models::resource_routes(AppState::new(repo).expect("state"))
}

pub fn app() -> Router {
    router(repository())
}

/// Sends a JSON request through the router and decodes the reply.
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&body).expect("encode"))
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

/// Creates kinds `people`, `stuff` and `things` (ids 1 to 3).
pub async fn seed_kinds(app: &Router) {
    let (status, _) = send(
        app,
        "POST",
        "/kind",
        Some(json!({"kinds": [{"name": "people"}, {"name": "stuff"}, {"name": "things"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}
