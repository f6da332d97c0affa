//! Demo consumer: serves one configured entity over HTTP.
//!
//! Run from repo root: `cargo run -p example-consumer`
//!
//! `ATLAS_CONFIG` optionally points at a JSON config file; `ATLAS__TABLES__WIDGETS=my_widgets`
//! style variables override it.

use atlas_core::{
    common_routes_with_ready, ensure_database_exists, entity_routes, AppState, ConfigRepository, ConfigStore,
    ConfiguredEntity, ConnectionRegistry, CrudService, Record, Relation, TableBinding,
};
use std::sync::Arc;
use tokio::net::TcpListener;

struct Widget;

impl ConfiguredEntity for Widget {
    const RESOURCE_KEY: &'static str = "widgets";
    fn default_table_name() -> String {
        "atlas_widgets".into()
    }
    fn relations() -> Vec<Relation> {
        vec![Relation::to_many::<Part>("parts", "id", "widget_id")]
    }
}

struct Part;

impl ConfiguredEntity for Part {
    const RESOURCE_KEY: &'static str = "parts";
    fn default_table_name() -> String {
        "atlas_parts".into()
    }
}

async fn create_tables(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    let widgets = TableBinding::of::<Widget>(&state.config)?;
    let parts = TableBinding::of::<Part>(&state.config)?;
    let pool = state.connections.pool(widgets.connection.as_deref())?;
    pool.execute_raw(&format!(
        "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, name TEXT NOT NULL, created_at TEXT, updated_at TEXT)",
        widgets.table
    ))
    .await?;
    let pool = state.connections.pool(parts.connection.as_deref())?;
    pool.execute_raw(&format!(
        "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, widget_id INTEGER NOT NULL, label TEXT, created_at TEXT, updated_at TEXT)",
        parts.table
    ))
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("atlas_core=info")),
        )
        .init();

    let mut config = match std::env::var("ATLAS_CONFIG") {
        Ok(path) => ConfigRepository::from_json_file(path)?,
        Err(_) => ConfigRepository::new(),
    };
    let overrides = config.load_env_overrides(&[Widget::CONFIG_PREFIX]);
    tracing::info!(overrides, "configuration loaded");

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".into());
    ensure_database_exists(&database_url).await?;
    let registry = ConnectionRegistry::connect_from_config(&config, &database_url).await?;
    let config: Arc<dyn ConfigStore> = Arc::new(config);
    let state = AppState::new(config, registry);

    create_tables(&state).await?;
    let widget = Record::<Widget>::new(&state.config, Default::default())?;
    tracing::info!(table = widget.table(), connection = ?widget.connection_name(), "widgets bound");

    let widgets = Arc::new(CrudService::<Widget>::new(state.clone()));
    let app = common_routes_with_ready(state).nest("/api/v1/widgets", entity_routes(widgets));

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
