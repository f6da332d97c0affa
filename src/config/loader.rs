//! Load configuration from a JSON file and from environment variables.

use crate::config::store::ConfigRepository;
use crate::error::ConfigError;
use serde_json::Value;
use std::path::Path;

/// Separator between path segments in environment variable names (`ATLAS__TABLES__WIDGETS`).
pub const ENV_SEPARATOR: &str = "__";

impl ConfigRepository {
    /// Read a JSON config document from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_value(value)
    }

    /// Apply overrides from the process environment (after loading `.env`, if any) for the given namespaces.
    /// Returns the number of values applied.
    pub fn load_env_overrides(&mut self, namespaces: &[&str]) -> usize {
        dotenvy::dotenv().ok();
        self.apply_env_pairs(std::env::vars(), namespaces)
    }

    /// Apply `NAMESPACE__SEG__SEG=value` pairs. The namespace matches case-insensitively, with `_` standing for `-`.
    ///
    /// Path segments are lowercased: `ATLAS__TABLES__MYWIDGETS` sets `atlas.tables.mywidgets`, so resource
    /// keys containing uppercase letters (e.g. `myWidgets`) cannot be overridden from the environment.
    /// Use a JSON config file for those.
    pub fn apply_env_pairs<I>(&mut self, vars: I, namespaces: &[&str]) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut applied = 0;
        for (name, value) in vars {
            let Some(path) = env_name_to_path(&name, namespaces) else { continue };
            tracing::debug!(env = %name, path = %path, "config override from environment");
            self.set(&path, Value::String(value));
            applied += 1;
        }
        applied
    }
}

fn env_name_to_path(name: &str, namespaces: &[&str]) -> Option<String> {
    let mut segments = name.split(ENV_SEPARATOR);
    let head = segments.next()?;
    let namespace = namespaces
        .iter()
        .find(|ns| ns.replace('-', "_").eq_ignore_ascii_case(head))?;
    let rest: Vec<String> = segments
        .map(|s| s.to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if rest.is_empty() {
        return None;
    }
    Some(format!("{}.{}", namespace, rest.join(".")))
}
