//! Service routes: health, version, and the endpoint index.

use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    resources: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        resources: state.registry.resources().len(),
    })
}

async fn version() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Every bound path, in binding order.
async fn index(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "endpoints": state.registry.endpoints() }))
}

/// GET /, GET /health, GET /version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/version", get(version))
        .with_state(state)
}
