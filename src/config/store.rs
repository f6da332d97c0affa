//! Dotted-path configuration store.

use crate::error::ConfigError;
use serde_json::{Map, Value};

/// Read-only lookup of configuration values by dotted path (e.g. `atlas.tables.widgets`).
pub trait ConfigStore: Send + Sync {
    /// Value at `path`, or None when any segment is missing.
    fn get(&self, path: &str) -> Option<Value>;

    /// Value at `path`, or `default` when absent.
    fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }
}

/// In-memory configuration tree backed by a JSON object.
#[derive(Clone, Debug)]
pub struct ConfigRepository {
    root: Map<String, Value>,
}

impl Default for ConfigRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigRepository {
    pub fn new() -> Self {
        ConfigRepository { root: Map::new() }
    }

    /// Build from a JSON document. The top level must be an object.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(root) => Ok(ConfigRepository { root }),
            other => Err(ConfigError::InvalidConfiguration(format!(
                "configuration root must be an object, got {}",
                type_name_of_json(&other)
            ))),
        }
    }

    /// Set `path` to `value`, creating intermediate objects. Non-object intermediates are replaced.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else { return };
        let mut node = &mut self.root;
        for seg in segments {
            let entry = node
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            node = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        node.insert(last.to_string(), value.into());
    }

    /// Remove the value at `path`. Returns the removed value.
    pub fn forget(&mut self, path: &str) -> Option<Value> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop()?;
        let mut node = &mut self.root;
        for seg in segments {
            node = node.get_mut(seg)?.as_object_mut()?;
        }
        node.remove(last)
    }

    /// Deep-merge another document into this one; `other` wins on conflicts.
    pub fn merge(&mut self, other: Map<String, Value>) {
        merge_into(&mut self.root, other);
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }
}

impl ConfigStore for ConfigRepository {
    fn get(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut node = self.root.get(first)?;
        for seg in segments {
            node = node.as_object()?.get(seg)?;
        }
        Some(node.clone())
    }
}

fn merge_into(target: &mut Map<String, Value>, other: Map<String, Value>) {
    for (k, v) in other {
        match (target.get_mut(&k), v) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_into(existing, incoming),
            (_, v) => {
                target.insert(k, v);
            }
        }
    }
}

fn type_name_of_json(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
