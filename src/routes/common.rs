//! Common routes: health, readiness, version.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    database: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    connections: BTreeMap<String, &'static str>,
}

fn status_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "unavailable"
    }
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// 200 when the default pool answers; named connections are reported but do not fail readiness.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let default_ok = state.connections.default_pool().ping().await;
    let mut connections = BTreeMap::new();
    for name in state.connections.names() {
        let ok = match state.connections.pool(Some(name)) {
            Ok(pool) => pool.ping().await,
            Err(_) => false,
        };
        if !ok {
            tracing::warn!(connection = %name, "readiness check failed");
        }
        connections.insert(name.to_string(), status_label(ok));
    }
    let status = if default_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(ReadyBody {
            status: if default_ok { "ok" } else { "degraded" },
            database: status_label(default_ok),
            connections,
        }),
    )
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Common routes (no state): GET /health, GET /version, GET /info.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/info", get(version))
}

/// Common routes plus GET /ready.
pub fn common_routes_with_ready(state: AppState) -> Router {
    common_routes().merge(Router::new().route("/ready", get(ready)).with_state(state))
}
