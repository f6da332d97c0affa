//! Shared fixtures: test entities under the `atlas-testing` namespace and in-memory SQLite state.

#![allow(dead_code)]

use atlas_core::sql::QueryBuf;
use atlas_core::{
    AppState, ConfigRepository, ConfigStore, ConfiguredEntity, ConnectionRegistry, DbPool, KeyType, Relation,
    TableBinding,
};
use serde_json::{Map, Value};
use std::sync::Arc;

pub const PREFIX: &str = "atlas-testing";

pub struct Widget;

impl ConfiguredEntity for Widget {
    const CONFIG_PREFIX: &'static str = PREFIX;
    const RESOURCE_KEY: &'static str = "widgets";
    fn default_table_name() -> String {
        "atlas_widgets".into()
    }
    fn relations() -> Vec<Relation> {
        vec![Relation::to_many::<Gadget>("gadgets", "id", "widget_id")]
    }
}

pub struct Gadget;

impl ConfiguredEntity for Gadget {
    const CONFIG_PREFIX: &'static str = PREFIX;
    const RESOURCE_KEY: &'static str = "gadgets";
    fn default_table_name() -> String {
        "atlas_gadgets".into()
    }
    fn relations() -> Vec<Relation> {
        vec![Relation::to_one::<Widget>("widget", "widget_id", "id")]
    }
}

/// Soft-deleting entity with generated UUID keys.
pub struct Note;

impl ConfiguredEntity for Note {
    const CONFIG_PREFIX: &'static str = PREFIX;
    const RESOURCE_KEY: &'static str = "notes";
    const KEY_TYPE: KeyType = KeyType::Uuid;
    const SOFT_DELETES: bool = true;
    fn default_table_name() -> String {
        "atlas_notes".into()
    }
}

/// Declares no primary key, so no service can be bound to it.
pub struct Keyless;

impl ConfiguredEntity for Keyless {
    const CONFIG_PREFIX: &'static str = PREFIX;
    const RESOURCE_KEY: &'static str = "keyless";
    const PRIMARY_KEY: &'static str = "";
    fn default_table_name() -> String {
        "atlas_keyless".into()
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m,
        other => panic!("expected object, got {other}"),
    }
}

pub async fn memory_pool() -> DbPool {
    DbPool::connect("sqlite::memory:").await.unwrap()
}

/// Create the fixture tables (under their resolved names) on `pool`.
pub async fn create_tables(config: &Arc<dyn ConfigStore>, pool: &DbPool) {
    let widgets = TableBinding::of::<Widget>(config).unwrap();
    let gadgets = TableBinding::of::<Gadget>(config).unwrap();
    let notes = TableBinding::of::<Note>(config).unwrap();
    pool.execute_raw(&format!(
        "CREATE TABLE {} (id INTEGER PRIMARY KEY, name TEXT NOT NULL, created_at TEXT, updated_at TEXT)",
        widgets.table
    ))
    .await
    .unwrap();
    pool.execute_raw(&format!(
        "CREATE TABLE {} (id INTEGER PRIMARY KEY, widget_id INTEGER NOT NULL, label TEXT, created_at TEXT, updated_at TEXT)",
        gadgets.table
    ))
    .await
    .unwrap();
    pool.execute_raw(&format!(
        "CREATE TABLE {} (id TEXT PRIMARY KEY, body TEXT, created_at TEXT, updated_at TEXT, deleted_at TEXT)",
        notes.table
    ))
    .await
    .unwrap();
}

/// Route library logs to the test writer; `RUST_LOG=atlas_core=debug` shows executed SQL.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// State over a fresh in-memory database with all fixture tables on the default connection.
pub async fn state_with(config: ConfigRepository) -> AppState {
    init_tracing();
    let config: Arc<dyn ConfigStore> = Arc::new(config);
    let pool = memory_pool().await;
    create_tables(&config, &pool).await;
    AppState::new(config, ConnectionRegistry::new(pool))
}

pub async fn state() -> AppState {
    state_with(ConfigRepository::new()).await
}

pub async fn count_rows(pool: &DbPool, table: &str) -> i64 {
    let q = QueryBuf {
        sql: format!("SELECT COUNT(*) AS n FROM {}", table),
        params: vec![],
    };
    let row = pool.fetch_optional(&q).await.unwrap().unwrap();
    row.get("n").and_then(Value::as_i64).unwrap()
}
