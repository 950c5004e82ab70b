//! Resource routes. Paths are parameterized; handlers resolve the resource by segment.

use crate::handlers::resource::{
    create, delete, delete_record, list, options, options_record, read, update, update_record,
};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Largest accepted request body.
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/:resource",
            get(list).post(create).patch(update).delete(delete).options(options),
        )
        .route(
            "/:resource/:id",
            get(read)
                .patch(update_record)
                .delete(delete_record)
                .options(options_record),
        )
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .with_state(state)
}
