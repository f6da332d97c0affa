//! Entity instances: attribute maps bound to the table and connection resolved at construction.

use crate::config::{ConfigStore, ResourceNameResolver};
use crate::error::ConfigError;
use crate::model::entity::{is_valid_identifier, ConfiguredEntity};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

/// Effective table and connection for one entity type, as resolved from configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableBinding {
    pub table: String,
    /// None means the default connection.
    pub connection: Option<String>,
}

impl TableBinding {
    /// Resolve the binding the way a freshly constructed instance of `E` would.
    pub fn of<E: ConfiguredEntity>(config: &Arc<dyn ConfigStore>) -> Result<Self, ConfigError> {
        let record = Record::<E>::new(config, Map::new())?;
        Ok(record.binding())
    }
}

/// One instance of a configured entity type.
///
/// Table and connection are fixed at construction and never re-resolved.
pub struct Record<E> {
    attributes: Map<String, Value>,
    original: Map<String, Value>,
    relations: Map<String, Value>,
    table: String,
    connection: Option<String>,
    exists: bool,
    resolver: OnceLock<ResourceNameResolver>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: ConfiguredEntity> Record<E> {
    /// Construct a new, unsaved instance. Resolves the effective table and connection from `config`.
    pub fn new(config: &Arc<dyn ConfigStore>, attributes: Map<String, Value>) -> Result<Self, ConfigError> {
        let mut record = Record {
            attributes,
            original: Map::new(),
            relations: Map::new(),
            table: String::new(),
            connection: None,
            exists: false,
            resolver: OnceLock::new(),
            _entity: PhantomData,
        };
        record.table = record.resolve_configured_table_name(config)?;
        if let Some(connection) = record.resolve_configured_connection(config)? {
            record.connection = Some(connection);
        }
        tracing::debug!(
            entity = E::type_name(),
            table = %record.table,
            connection = ?record.connection,
            "resolved table binding"
        );
        Ok(record)
    }

    /// Instance read back from storage: bound to the table/connection it was read from.
    pub fn hydrate(binding: &TableBinding, attributes: Map<String, Value>) -> Self {
        Record {
            original: attributes.clone(),
            attributes,
            relations: Map::new(),
            table: binding.table.clone(),
            connection: binding.connection.clone(),
            exists: true,
            resolver: OnceLock::new(),
            _entity: PhantomData,
        }
    }

    fn resolve_configured_table_name(&self, config: &Arc<dyn ConfigStore>) -> Result<String, ConfigError> {
        let resolver = self.table_resolver(config)?;
        let key = resource_key::<E>()?;
        let table = resolver.resolve_storage_name(key, &E::default_table_name());
        if table.trim().is_empty() {
            return Err(ConfigError::MisconfiguredEntityType {
                type_name: E::type_name(),
                reason: "no table configured and the default table name is empty".into(),
            });
        }
        if !is_valid_identifier(&table) {
            return Err(ConfigError::InvalidConfiguration(format!(
                "table name '{}' for {} is not a valid identifier",
                table,
                resolver.storage_key_path(key)
            )));
        }
        Ok(table)
    }

    fn resolve_configured_connection(&self, config: &Arc<dyn ConfigStore>) -> Result<Option<String>, ConfigError> {
        Ok(self.table_resolver(config)?.resolve_connection(None))
    }

    /// Resolver for this instance, created on first use.
    fn table_resolver(&self, config: &Arc<dyn ConfigStore>) -> Result<&ResourceNameResolver, ConfigError> {
        if let Some(resolver) = self.resolver.get() {
            return Ok(resolver);
        }
        let resolver = ResourceNameResolver::new(config_prefix::<E>()?, Arc::clone(config))?;
        Ok(self.resolver.get_or_init(|| resolver))
    }

    pub fn binding(&self) -> TableBinding {
        TableBinding {
            table: self.table.clone(),
            connection: self.connection.clone(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn key(&self) -> Option<&Value> {
        self.attributes.get(E::PRIMARY_KEY).filter(|v| !v.is_null())
    }

    /// Key the instance was loaded or last saved with; unaffected by later `set`/`fill`.
    pub fn original_key(&self) -> Option<&Value> {
        self.original.get(E::PRIMARY_KEY).filter(|v| !v.is_null())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.attributes.get(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.attributes.get(column).and_then(Value::as_i64)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(column.into(), value.into());
    }

    pub fn fill(&mut self, data: Map<String, Value>) {
        for (k, v) in data {
            self.attributes.insert(k, v);
        }
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Attributes changed since the instance was loaded or last saved.
    pub fn dirty(&self) -> Map<String, Value> {
        self.attributes
            .iter()
            .filter(|(k, v)| self.original.get(k.as_str()) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn relation(&self, name: &str) -> Option<&Value> {
        self.relations.get(name)
    }

    pub(crate) fn set_relation(&mut self, name: &str, value: Value) {
        self.relations.insert(name.to_string(), value);
    }

    /// Merge the persisted row into the attributes and mark the instance as existing and clean.
    pub(crate) fn sync_persisted(&mut self, row: Map<String, Value>) {
        for (k, v) in row {
            self.attributes.insert(k, v);
        }
        self.original = self.attributes.clone();
        self.exists = true;
    }

    /// Set a computed attribute (e.g. a relation count) without making the instance dirty.
    pub(crate) fn set_loaded(&mut self, column: String, value: Value) {
        self.original.insert(column.clone(), value.clone());
        self.attributes.insert(column, value);
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.exists = false;
    }

    /// Attributes merged with loaded relations.
    pub fn to_json(&self) -> Value {
        let mut out = self.attributes.clone();
        for (k, v) in &self.relations {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }
}

impl<E> std::fmt::Debug for Record<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table)
            .field("connection", &self.connection)
            .field("exists", &self.exists)
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .finish()
    }
}

impl<E> Serialize for Record<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.attributes.len() + self.relations.len()))?;
        for (k, v) in &self.attributes {
            if !self.relations.contains_key(k) {
                map.serialize_entry(k, v)?;
            }
        }
        for (k, v) in &self.relations {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn config_prefix<E: ConfiguredEntity>() -> Result<&'static str, ConfigError> {
    let prefix = E::CONFIG_PREFIX.trim();
    if prefix.is_empty() {
        return Err(ConfigError::MisconfiguredEntityType {
            type_name: E::type_name(),
            reason: "implementation must define a configuration prefix".into(),
        });
    }
    Ok(prefix)
}

fn resource_key<E: ConfiguredEntity>() -> Result<&'static str, ConfigError> {
    let key = E::RESOURCE_KEY.trim();
    if key.is_empty() {
        return Err(ConfigError::MisconfiguredEntityType {
            type_name: E::type_name(),
            reason: "implementation must define a resource key".into(),
        });
    }
    Ok(key)
}
