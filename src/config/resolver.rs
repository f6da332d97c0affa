//! Resolves logical resource keys to effective table names and connections.

use crate::config::store::ConfigStore;
use crate::error::ConfigError;
use serde_json::Value;
use std::sync::Arc;

/// Reads `<prefix>.tables.<key>` and `<prefix>.database.connection` from one config store.
/// Absent and blank values both fall back to the caller's default.
#[derive(Clone)]
pub struct ResourceNameResolver {
    prefix: String,
    store: Arc<dyn ConfigStore>,
}

impl std::fmt::Debug for ResourceNameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceNameResolver")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl ResourceNameResolver {
    pub fn new(prefix: &str, store: Arc<dyn ConfigStore>) -> Result<Self, ConfigError> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "the configuration prefix must not be empty".into(),
            ));
        }
        Ok(ResourceNameResolver {
            prefix: prefix.to_string(),
            store,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn storage_key_path(&self, resource_key: &str) -> String {
        format!("{}.tables.{}", self.prefix, resource_key)
    }

    pub fn resolve_storage_name(&self, resource_key: &str, default: &str) -> String {
        let path = self.storage_key_path(resource_key);
        let value = self.store.get_or(&path, Value::String(default.to_string()));
        non_blank(&path, &value).unwrap_or_else(|| default.to_string())
    }

    pub fn connection_key_path(&self) -> String {
        format!("{}.database.connection", self.prefix)
    }

    pub fn resolve_connection(&self, default: Option<&str>) -> Option<String> {
        let path = self.connection_key_path();
        let fallback = default.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null);
        let value = self.store.get_or(&path, fallback);
        non_blank(&path, &value).or_else(|| default.map(str::to_string))
    }
}

/// Scalar config value as trimmed text; None when null, blank, or not a scalar.
fn non_blank(path: &str, value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => return None,
        Value::Array(_) | Value::Object(_) => {
            tracing::warn!(path = %path, "ignoring non-scalar configuration value");
            return None;
        }
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
