//! Entity CRUD handlers, generic over the service bound to the router.

use crate::error::AppError;
use crate::model::{ConfiguredEntity, KeyType};
use crate::response::{success_many, success_one, success_one_ok, success_page};
use crate::service::{ModelService, QueryOptions};
use crate::sql::Columns;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn parse_id<E: ConfiguredEntity>(id_str: &str) -> Result<Value, AppError> {
    Ok(match E::KEY_TYPE {
        KeyType::Uuid => {
            let u = uuid::Uuid::parse_str(id_str).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
            Value::String(u.to_string())
        }
        KeyType::Integer => {
            let n: i64 = id_str.parse().map_err(|_| AppError::BadRequest("invalid id".into()))?;
            Value::Number(n.into())
        }
        KeyType::Text => Value::String(id_str.to_string()),
    })
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn columns_param(params: &HashMap<String, String>) -> Columns {
    match params.get("columns") {
        Some(raw) if !raw.trim().is_empty() => Columns::only(raw.split(',').map(str::trim).filter(|c| !c.is_empty())),
        _ => Columns::All,
    }
}

/// `GET /`: plain list, or a page when `perPage` is given.
pub async fn list<S: ModelService + 'static>(
    State(service): State<Arc<S>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let options = QueryOptions::from_params(&params);
    if let Some(raw) = params.get("perPage") {
        let per_page: u64 = raw
            .trim()
            .parse()
            .map_err(|_| AppError::BadRequest("perPage must be a positive integer".into()))?;
        let page = service.list_paginated(per_page, &options).await?;
        return Ok(success_page(page).into_response());
    }
    let records = service.list(&columns_param(&params), &options).await?;
    Ok(success_many(records).into_response())
}

pub async fn create<S: ModelService + 'static>(
    State(service): State<Arc<S>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let record = service.create(body_to_map(body)?).await?;
    Ok(success_one(record))
}

pub async fn read<S: ModelService + 'static>(
    State(service): State<Arc<S>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id::<S::Entity>(&id_str)?;
    let record = service.find_or_fail(&id).await?;
    Ok(success_one_ok(record))
}

pub async fn update<S: ModelService + 'static>(
    State(service): State<Arc<S>>,
    Path(id_str): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id::<S::Entity>(&id_str)?;
    let record = service.update_by_key(&id, body_to_map(body)?).await?;
    Ok(success_one_ok(record))
}

/// `DELETE /:id`; `?force=true` hard-deletes soft-deleting entities.
pub async fn delete<S: ModelService + 'static>(
    State(service): State<Arc<S>>,
    Path(id_str): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id::<S::Entity>(&id_str)?;
    let force = params
        .get("force")
        .map(|f| f == "1" || f.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let mut record = service.find_or_fail(&id).await?;
    if !service.delete(&mut record, force).await? {
        return Err(AppError::NotFound(id_str));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doc;

    impl ConfiguredEntity for Doc {
        const RESOURCE_KEY: &'static str = "docs";
        const KEY_TYPE: KeyType = KeyType::Uuid;
        fn default_table_name() -> String {
            "docs".into()
        }
    }

    struct Counter;

    impl ConfiguredEntity for Counter {
        const RESOURCE_KEY: &'static str = "counters";
        fn default_table_name() -> String {
            "counters".into()
        }
    }

    #[test]
    fn test_parse_id_by_key_type() {
        assert_eq!(parse_id::<Counter>("42").unwrap(), Value::from(42));
        assert!(matches!(parse_id::<Counter>("x"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_id::<Doc>("not-a-uuid"), Err(AppError::BadRequest(_))));
        let id = "6f1c2a4e-2c4f-4a57-9a0e-1d2b3c4d5e6f";
        assert_eq!(parse_id::<Doc>(id).unwrap(), Value::from(id));
    }

    #[test]
    fn test_columns_param() {
        let mut params = HashMap::new();
        assert!(matches!(columns_param(&params), Columns::All));
        params.insert("columns".to_string(), "id, name".to_string());
        assert!(matches!(columns_param(&params), Columns::Only(c) if c == vec!["id", "name"]));
    }
}
