//! Generic CRUD over a configured entity: list, paginate, find, create, update, delete.

use crate::error::AppError;
use crate::model::{ConfiguredEntity, EntityMeta, IncludeDirection, KeyType, Record, RelatedTable, Relation, TableBinding};
use crate::service::options::{apply_query_options, QueryOptions};
use crate::service::page::Page;
use crate::sql::{self, Columns, DbPool, Query};
use crate::state::AppState;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::marker::PhantomData;

/// CRUD operations bound to one entity type.
///
/// Implementors supply the entity type and shared state. `build_query` is the customization
/// hook: override it to add default constraints that every list and page request inherits.
#[async_trait]
pub trait ModelService: Send + Sync {
    type Entity: ConfiguredEntity;

    fn state(&self) -> &AppState;

    fn service_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Fresh query over the entity's resolved table and connection.
    ///
    /// Fails with `UnconfiguredService` when the entity cannot be queried (no usable primary key),
    /// before any data access.
    fn query(&self) -> Result<Query, AppError> {
        let meta = EntityMeta::of::<Self::Entity>();
        meta.ensure_capable(self.service_name())?;
        let binding = TableBinding::of::<Self::Entity>(&self.state().config)?;
        Ok(Query::new(binding, meta))
    }

    /// Base query for list operations. Options are applied by the caller after this returns.
    fn build_query(&self, _options: &QueryOptions) -> Result<Query, AppError> {
        self.query()
    }

    async fn list(&self, columns: &Columns, options: &QueryOptions) -> Result<Vec<Record<Self::Entity>>, AppError> {
        let mut query = self.build_query(options)?;
        apply_query_options(&mut query, options);
        let eager = EagerPlan::resolve(self.state(), &query)?;
        let pool = self.state().connections.pool(query.binding().connection.as_deref())?;
        let mut records = fetch_records(pool, &query, columns).await?;
        eager.load(self.state(), &mut records).await?;
        tracing::debug!(service = self.service_name(), rows = records.len(), "list");
        Ok(records)
    }

    async fn list_paginated(
        &self,
        per_page: u64,
        options: &QueryOptions,
    ) -> Result<Page<Record<Self::Entity>>, AppError> {
        if per_page == 0 {
            return Err(AppError::BadRequest("page size must be a positive integer".into()));
        }
        let mut query = self.build_query(options)?;
        apply_query_options(&mut query, options);
        if let Some(field) = options.sort_field.as_deref().filter(|f| !f.is_empty()) {
            query.order_by(field, options.sort_order);
        }
        // LIMIT/OFFSET are signed 64-bit in SQL.
        let per_page = per_page.min(i64::MAX as u64);
        let current_page = options.page.unwrap_or(1).max(1);
        let eager = EagerPlan::resolve(self.state(), &query)?;
        let pool = self.state().connections.pool(query.binding().connection.as_deref())?;

        let total = count_rows(pool, &query).await?;
        let mut records = Vec::new();
        // Pages past the end (including offsets that overflow) are empty without a second query.
        if let Some(offset) = (current_page - 1).checked_mul(per_page).filter(|o| *o < total) {
            query.limit(per_page).offset(offset);
            records = fetch_records(pool, &query, &Columns::All).await?;
            eager.load(self.state(), &mut records).await?;
        }
        Ok(Page::new(records, total, per_page, current_page))
    }

    async fn find(&self, id: &Value) -> Result<Option<Record<Self::Entity>>, AppError> {
        let mut query = self.query()?;
        let pk = query.meta().primary_key;
        query.where_eq(pk, id.clone()).limit(1);
        let pool = self.state().connections.pool(query.binding().connection.as_deref())?;
        let records = fetch_records(pool, &query, &Columns::All).await?;
        Ok(records.into_iter().next())
    }

    async fn find_or_fail(&self, id: &Value) -> Result<Record<Self::Entity>, AppError> {
        self.find(id).await?.ok_or_else(|| not_found::<Self::Entity>(id))
    }

    /// Insert a new instance from `data`. Timestamps and UUID keys are filled when absent.
    async fn create(&self, data: Map<String, Value>) -> Result<Record<Self::Entity>, AppError> {
        let meta = EntityMeta::of::<Self::Entity>();
        meta.ensure_capable(self.service_name())?;
        let mut record = Record::<Self::Entity>::new(&self.state().config, data)?;
        if meta.key_type == KeyType::Uuid && record.key().map_or(true, Value::is_null) {
            record.set(meta.primary_key, uuid::Uuid::new_v4().to_string());
        }
        if let Some((created_at, updated_at)) = meta.timestamps {
            let now = now_timestamp();
            for column in [created_at, updated_at] {
                if record.get(column).map_or(true, Value::is_null) {
                    record.set(column, now.clone());
                }
            }
        }
        let pool = self.state().connections.pool(record.connection_name())?;
        let row = pool
            .fetch_optional(&sql::insert(record.table(), &meta, record.attributes()))
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        record.sync_persisted(row);
        tracing::info!(service = self.service_name(), table = record.table(), "created");
        Ok(record)
    }

    /// Find by key and update. A missing key fails with `NotFound` and nothing is modified.
    async fn update_by_key(&self, id: &Value, data: Map<String, Value>) -> Result<Record<Self::Entity>, AppError> {
        let record = self.find_or_fail(id).await?;
        self.update(record, data).await
    }

    /// Fill `data` into an existing instance and persist the changed attributes.
    ///
    /// An instance that does not exist in storage is returned unchanged. The row is addressed by
    /// the key it was loaded with; `data` may repeat that key but not change it.
    async fn update(
        &self,
        mut record: Record<Self::Entity>,
        mut data: Map<String, Value>,
    ) -> Result<Record<Self::Entity>, AppError> {
        if !record.exists() {
            tracing::debug!(service = self.service_name(), "update skipped: instance not persisted");
            return Ok(record);
        }
        let meta = EntityMeta::of::<Self::Entity>();
        let id = record
            .original_key()
            .cloned()
            .ok_or_else(|| AppError::BadRequest(format!("{} has no primary key value", meta.type_name)))?;
        if let Some(requested) = data.remove(meta.primary_key) {
            if key_string(&requested) != key_string(&id) {
                return Err(AppError::BadRequest(format!(
                    "primary key of {} cannot be changed ({} to {})",
                    meta.type_name, id, requested
                )));
            }
        }
        record.fill(data);
        let mut dirty = record.dirty();
        if dirty.is_empty() {
            return Ok(record);
        }
        if let Some((_, updated_at)) = meta.timestamps {
            if !dirty.contains_key(updated_at) {
                let now = Value::String(now_timestamp());
                record.set(updated_at, now.clone());
                dirty.insert(updated_at.to_string(), now);
            }
        }
        let pool = self.state().connections.pool(record.connection_name())?;
        let row = pool
            .fetch_optional(&sql::update(record.table(), &meta, &id, &dirty))
            .await?
            .ok_or_else(|| not_found::<Self::Entity>(&id))?;
        record.sync_persisted(row);
        Ok(record)
    }

    /// Delete an instance. Soft-deleting entities are marked trashed unless `force` is set.
    ///
    /// Returns false when the instance was not persisted or no row matched.
    async fn delete(&self, record: &mut Record<Self::Entity>, force: bool) -> Result<bool, AppError> {
        if !record.exists() {
            return Ok(false);
        }
        let meta = EntityMeta::of::<Self::Entity>();
        let Some(id) = record.original_key().cloned() else {
            return Err(AppError::BadRequest(format!("{} has no primary key value", meta.type_name)));
        };
        let pool = self.state().connections.pool(record.connection_name())?;
        match meta.soft_delete_column {
            Some(deleted_at) if !force => {
                let now = Value::String(now_timestamp());
                let mut changes = Map::new();
                changes.insert(deleted_at.to_string(), now.clone());
                if let Some((_, updated_at)) = meta.timestamps {
                    changes.insert(updated_at.to_string(), now);
                }
                let row = pool.fetch_optional(&sql::update(record.table(), &meta, &id, &changes)).await?;
                let Some(row) = row else {
                    return Ok(false);
                };
                record.sync_persisted(row);
                tracing::info!(service = self.service_name(), table = record.table(), "soft deleted");
                Ok(true)
            }
            _ => {
                let affected = pool.execute(&sql::delete(record.table(), &meta, &id)).await?;
                record.mark_deleted();
                tracing::info!(service = self.service_name(), table = record.table(), affected, "deleted");
                Ok(affected > 0)
            }
        }
    }
}

/// Default service: the plain CRUD behavior for entity `E`.
pub struct CrudService<E> {
    state: AppState,
    _entity: PhantomData<fn() -> E>,
}

impl<E: ConfiguredEntity> CrudService<E> {
    pub fn new(state: AppState) -> Self {
        CrudService {
            state,
            _entity: PhantomData,
        }
    }
}

impl<E> Clone for CrudService<E> {
    fn clone(&self) -> Self {
        CrudService {
            state: self.state.clone(),
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E: ConfiguredEntity> ModelService for CrudService<E> {
    type Entity = E;

    fn state(&self) -> &AppState {
        &self.state
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn not_found<E: ConfiguredEntity>(id: &Value) -> AppError {
    AppError::NotFound(format!("no {} found for key {}", E::type_name(), id))
}

async fn fetch_records<E: ConfiguredEntity>(
    pool: &DbPool,
    query: &Query,
    columns: &Columns,
) -> Result<Vec<Record<E>>, AppError> {
    let rows = pool.fetch_all(&sql::select(query, columns)).await?;
    Ok(rows
        .into_iter()
        .map(|row| Record::hydrate(query.binding(), row))
        .collect())
}

async fn count_rows(pool: &DbPool, query: &Query) -> Result<u64, AppError> {
    let row = pool.fetch_optional(&sql::count(query)).await?;
    Ok(row
        .as_ref()
        .and_then(|r| r.get("aggregate"))
        .and_then(Value::as_i64)
        .map_or(0, |n| n.max(0) as u64))
}

/// Grouping key for matching related rows: strings as-is, other scalars by their JSON text.
fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn distinct_keys<E: ConfiguredEntity>(records: &[Record<E>], column: &str) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    records
        .iter()
        .filter_map(|r| r.get(column))
        .filter(|v| !v.is_null())
        .filter(|v| seen.insert(key_string(v)))
        .cloned()
        .collect()
}

/// Relations requested on a query, resolved before any rows are fetched.
struct EagerPlan {
    loads: Vec<(Relation, RelatedTable)>,
    counts: Vec<(Relation, RelatedTable)>,
}

impl EagerPlan {
    fn resolve(state: &AppState, query: &Query) -> Result<Self, AppError> {
        let lookup = |name: &String| -> Result<(Relation, RelatedTable), AppError> {
            let meta = query.meta();
            let relation = meta.relation(name).ok_or_else(|| AppError::RelationNotFound {
                entity: meta.type_name,
                relation: name.clone(),
            })?;
            let related = relation.resolve(&state.config)?;
            Ok((relation, related))
        };
        Ok(EagerPlan {
            loads: query.eager().iter().map(&lookup).collect::<Result<_, _>>()?,
            counts: query.eager_counts().iter().map(&lookup).collect::<Result<_, _>>()?,
        })
    }

    async fn load<E: ConfiguredEntity>(&self, state: &AppState, records: &mut [Record<E>]) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }
        for (relation, related) in &self.loads {
            let keys = distinct_keys(records, relation.our_key);
            let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
            if !keys.is_empty() {
                let pool = state.connections.pool(related.binding.connection.as_deref())?;
                let rows = pool
                    .fetch_all(&sql::select_by_column_in(related, relation.their_key, &keys))
                    .await?;
                for row in rows {
                    let Some(key) = row.get(relation.their_key).map(key_string) else {
                        continue;
                    };
                    grouped.entry(key).or_default().push(Value::Object(row));
                }
            }
            for record in records.iter_mut() {
                let items = record
                    .get(relation.our_key)
                    .and_then(|k| grouped.get(&key_string(k)))
                    .cloned()
                    .unwrap_or_default();
                let value = match relation.direction {
                    IncludeDirection::ToMany => Value::Array(items),
                    IncludeDirection::ToOne => items.into_iter().next().unwrap_or(Value::Null),
                };
                record.set_relation(relation.name, value);
            }
        }
        for (relation, related) in &self.counts {
            let keys = distinct_keys(records, relation.our_key);
            let mut counts: HashMap<String, i64> = HashMap::new();
            if !keys.is_empty() {
                let pool = state.connections.pool(related.binding.connection.as_deref())?;
                let rows = pool
                    .fetch_all(&sql::count_by_column_in(related, relation.their_key, &keys))
                    .await?;
                for row in rows {
                    if let (Some(key), Some(n)) = (row.get("key"), row.get("aggregate").and_then(Value::as_i64)) {
                        counts.insert(key_string(key), n);
                    }
                }
            }
            let column = format!("{}_count", relation.name);
            for record in records.iter_mut() {
                let n = record
                    .get(relation.our_key)
                    .and_then(|k| counts.get(&key_string(k)))
                    .copied()
                    .unwrap_or(0);
                record.set_loaded(column.clone(), Value::from(n));
            }
        }
        Ok(())
    }
}
