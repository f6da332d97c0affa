//! Connection pools (PostgreSQL or SQLite) and row-to-JSON conversion.

use crate::error::{AppError, ConfigError};
use crate::sql::builder::QueryBuf;
use crate::sql::params::{bind_pg, bind_sqlite};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Row};
use std::str::FromStr;

/// Pool for one named connection. Backend is chosen from the URL scheme.
#[derive(Clone, Debug)]
pub enum DbPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Connect to `url`. `sqlite:` URLs open SQLite (in-memory databases keep a single connection); anything else is PostgreSQL.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        if url.starts_with("sqlite:") {
            let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
            let in_memory = url.contains(":memory:") || url.contains("mode=memory");
            let mut pool_opts = SqlitePoolOptions::new();
            if in_memory {
                pool_opts = pool_opts.max_connections(1).idle_timeout(None).max_lifetime(None);
            }
            let pool = pool_opts.connect_with(opts).await?;
            tracing::info!(backend = "sqlite", in_memory, "connected");
            Ok(DbPool::Sqlite(pool))
        } else {
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            tracing::info!(backend = "postgres", "connected");
            Ok(DbPool::Postgres(pool))
        }
    }

    pub async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Map<String, Value>>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        match self {
            DbPool::Postgres(pool) => {
                let query = q.params.iter().fold(sqlx::query(&q.sql), bind_pg);
                let rows = query.fetch_all(pool).await?;
                Ok(rows.iter().map(pg_row_to_json).collect())
            }
            DbPool::Sqlite(pool) => {
                let query = q.params.iter().fold(sqlx::query(&q.sql), bind_sqlite);
                let rows = query.fetch_all(pool).await?;
                Ok(rows.iter().map(sqlite_row_to_json).collect())
            }
        }
    }

    pub async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Map<String, Value>>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        match self {
            DbPool::Postgres(pool) => {
                let query = q.params.iter().fold(sqlx::query(&q.sql), bind_pg);
                let row = query.fetch_optional(pool).await?;
                Ok(row.map(|r| pg_row_to_json(&r)))
            }
            DbPool::Sqlite(pool) => {
                let query = q.params.iter().fold(sqlx::query(&q.sql), bind_sqlite);
                let row = query.fetch_optional(pool).await?;
                Ok(row.map(|r| sqlite_row_to_json(&r)))
            }
        }
    }

    /// Execute a statement; returns rows affected.
    pub async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let affected = match self {
            DbPool::Postgres(pool) => {
                let query = q.params.iter().fold(sqlx::query(&q.sql), bind_pg);
                query.execute(pool).await?.rows_affected()
            }
            DbPool::Sqlite(pool) => {
                let query = q.params.iter().fold(sqlx::query(&q.sql), bind_sqlite);
                query.execute(pool).await?.rows_affected()
            }
        };
        Ok(affected)
    }

    /// Run raw SQL without parameters (DDL, setup).
    pub async fn execute_raw(&self, sql: &str) -> Result<(), AppError> {
        tracing::debug!(sql = %sql, "execute");
        match self {
            DbPool::Postgres(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn ping(&self) -> bool {
        self.execute_raw("SELECT 1").await.is_ok()
    }
}

/// Create the database named in a PostgreSQL URL if it does not exist. No-op for SQLite URLs.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    if database_url.starts_with("sqlite:") {
        return Ok(());
    }
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| ConfigError::InvalidConfiguration(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name.replace('"', "\"\"")))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "created database");
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| ConfigError::InvalidConfiguration("DATABASE_URL has no database path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}

fn pg_row_to_json(row: &PgRow) -> Map<String, Value> {
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), pg_cell_to_value(row, name));
    }
    map
}

fn pg_cell_to_value(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}

fn sqlite_row_to_json(row: &SqliteRow) -> Map<String, Value> {
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), sqlite_cell_to_value(row, name));
    }
    map
}

fn sqlite_cell_to_value(row: &SqliteRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(bytes)) = row.try_get::<Option<Vec<u8>>, _>(name) {
        return Value::Array(bytes.into_iter().map(|b| Value::Number(b.into())).collect());
    }
    Value::Null
}
