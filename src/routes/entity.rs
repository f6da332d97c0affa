//! Entity CRUD routes for one service. Nest the router under the entity's path.

use crate::handlers::entity::{create, delete as delete_handler, list, read, update};
use crate::service::ModelService;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn entity_routes<S: ModelService + 'static>(service: Arc<S>) -> Router {
    Router::new()
        .route("/", get(list::<S>).post(create::<S>))
        .route("/:id", get(read::<S>).patch(update::<S>).delete(delete_handler::<S>))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(service)
}
