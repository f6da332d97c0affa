//! Named connections: the default pool plus pools selected by an entity's resolved connection name.

use crate::config::ConfigStore;
use crate::error::{AppError, ConfigError};
use crate::sql::pool::DbPool;
use std::collections::HashMap;

/// Config path holding named connections: `database.connections.<name>.url`.
pub const CONNECTIONS_CONFIG_PATH: &str = "database.connections";

#[derive(Clone, Debug)]
pub struct ConnectionRegistry {
    default: DbPool,
    named: HashMap<String, DbPool>,
}

impl ConnectionRegistry {
    pub fn new(default: DbPool) -> Self {
        ConnectionRegistry {
            default,
            named: HashMap::new(),
        }
    }

    pub fn with_connection(mut self, name: impl Into<String>, pool: DbPool) -> Self {
        self.register(name, pool);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, pool: DbPool) {
        self.named.insert(name.into(), pool);
    }

    /// Connect the default pool from `default_url` and every entry under `database.connections`.
    pub async fn connect_from_config(config: &dyn ConfigStore, default_url: &str) -> Result<Self, AppError> {
        let mut registry = ConnectionRegistry::new(DbPool::connect(default_url).await?);
        let Some(connections) = config.get(CONNECTIONS_CONFIG_PATH) else {
            return Ok(registry);
        };
        let Some(entries) = connections.as_object() else {
            return Err(ConfigError::InvalidConfiguration(format!("{} must be an object", CONNECTIONS_CONFIG_PATH)).into());
        };
        for (name, entry) in entries {
            let url = entry
                .get("url")
                .and_then(|u| u.as_str())
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| {
                    ConfigError::InvalidConfiguration(format!("{}.{}.url is required", CONNECTIONS_CONFIG_PATH, name))
                })?;
            registry.register(name.clone(), DbPool::connect(url).await?);
            tracing::info!(connection = %name, "registered connection");
        }
        Ok(registry)
    }

    /// Pool for a resolved connection name; None selects the default pool.
    pub fn pool(&self, connection: Option<&str>) -> Result<&DbPool, ConfigError> {
        match connection {
            None => Ok(&self.default),
            Some(name) => self
                .named
                .get(name)
                .ok_or_else(|| ConfigError::UnknownConnection(name.to_string())),
        }
    }

    pub fn default_pool(&self) -> &DbPool {
        &self.default
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }
}
