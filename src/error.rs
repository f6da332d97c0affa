//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("misconfigured entity type {type_name}: {reason}")]
    MisconfiguredEntityType { type_name: &'static str, reason: String },
    #[error("unconfigured service {service}: {reason}")]
    UnconfiguredService { service: &'static str, reason: String },
    #[error("unknown connection '{0}'")]
    UnknownConnection(String),
    #[error("config load: {0}")]
    Load(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("call to undefined relationship '{relation}' on {entity}")]
    RelationNotFound { entity: &'static str, relation: String },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    /// HTTP status and stable machine-readable code for the error envelope.
    pub fn status_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(ConfigError::UnknownConnection(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "unknown_connection"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) | AppError::Db(sqlx::Error::RowNotFound) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::RelationNotFound { .. } => (StatusCode::BAD_REQUEST, "unknown_relation"),
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::RelationNotFound { entity, relation } => {
                Some(serde_json::json!({ "entity": entity, "relation": relation }))
            }
            AppError::Config(ConfigError::MisconfiguredEntityType { type_name, .. }) => {
                Some(serde_json::json!({ "entity": type_name }))
            }
            AppError::Config(ConfigError::UnconfiguredService { service, .. }) => {
                Some(serde_json::json!({ "service": service }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                details: self.details(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
