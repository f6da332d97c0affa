//! Entity type declarations: the facts each persistent resource type provides.

use crate::config::ConfigStore;
use crate::error::ConfigError;
use crate::model::record::TableBinding;
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Primary key kind. UUID keys are generated on create when the caller does not supply one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    Integer,
    Uuid,
    Text,
}

/// A persistent resource type whose table and connection come from configuration.
///
/// Implementors declare the resource key and default table; everything else has defaults:
///
/// ```ignore
/// struct Widget;
///
/// impl ConfiguredEntity for Widget {
///     const RESOURCE_KEY: &'static str = "widgets";
///     fn default_table_name() -> String { "atlas_widgets".into() }
/// }
/// ```
pub trait ConfiguredEntity: Send + Sync + 'static {
    /// Configuration namespace; lookups go to `<prefix>.tables.<key>` and `<prefix>.database.connection`.
    const CONFIG_PREFIX: &'static str = "atlas";
    const RESOURCE_KEY: &'static str;
    const PRIMARY_KEY: &'static str = "id";
    const KEY_TYPE: KeyType = KeyType::Integer;
    /// Fill `created_at` / `updated_at` on writes.
    const TIMESTAMPS: bool = true;
    const CREATED_AT: &'static str = "created_at";
    const UPDATED_AT: &'static str = "updated_at";
    /// Delete by setting `DELETED_AT` instead of removing the row.
    const SOFT_DELETES: bool = false;
    const DELETED_AT: &'static str = "deleted_at";

    /// Table used when configuration has no override.
    fn default_table_name() -> String;

    /// Relations available to eager loading (`with` / `withCount`).
    fn relations() -> Vec<Relation> {
        Vec::new()
    }

    /// Column casts for bound values, e.g. `("created_at", "timestamptz")` on PostgreSQL.
    fn column_casts() -> &'static [(&'static str, &'static str)] {
        &[]
    }

    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Type-erased view of a `ConfiguredEntity`, carried by queries.
#[derive(Clone, Copy)]
pub struct EntityMeta {
    pub type_name: &'static str,
    pub primary_key: &'static str,
    pub key_type: KeyType,
    pub timestamps: Option<(&'static str, &'static str)>,
    pub soft_delete_column: Option<&'static str>,
    pub casts: &'static [(&'static str, &'static str)],
    pub relations: fn() -> Vec<Relation>,
}

impl std::fmt::Debug for EntityMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMeta")
            .field("type_name", &self.type_name)
            .field("primary_key", &self.primary_key)
            .field("key_type", &self.key_type)
            .field("soft_delete_column", &self.soft_delete_column)
            .finish_non_exhaustive()
    }
}

impl EntityMeta {
    pub fn of<E: ConfiguredEntity>() -> Self {
        EntityMeta {
            type_name: E::type_name(),
            primary_key: E::PRIMARY_KEY,
            key_type: E::KEY_TYPE,
            timestamps: E::TIMESTAMPS.then_some((E::CREATED_AT, E::UPDATED_AT)),
            soft_delete_column: E::SOFT_DELETES.then_some(E::DELETED_AT),
            casts: E::column_casts(),
            relations: E::relations,
        }
    }

    /// Checks that the type can back a service: it must declare a usable primary key.
    pub fn ensure_capable(&self, service: &'static str) -> Result<(), ConfigError> {
        let pk = self.primary_key.trim();
        if pk.is_empty() {
            return Err(ConfigError::UnconfiguredService {
                service,
                reason: format!("bound type {} declares no primary key", self.type_name),
            });
        }
        if !is_valid_identifier(pk) {
            return Err(ConfigError::UnconfiguredService {
                service,
                reason: format!("bound type {} declares invalid primary key '{}'", self.type_name, pk),
            });
        }
        Ok(())
    }

    pub fn cast_for(&self, column: &str) -> Option<&'static str> {
        self.casts.iter().find(|(c, _)| *c == column).map(|(_, t)| *t)
    }

    pub fn relation(&self, name: &str) -> Option<Relation> {
        (self.relations)().into_iter().find(|r| r.name == name)
    }
}

/// Direction of a relation: to_one (we hold the key pointing at them) or to_many (they point at us).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncludeDirection {
    ToOne,
    ToMany,
}

/// Related table as resolved for one eager load.
#[derive(Clone, Debug)]
pub struct RelatedTable {
    pub binding: TableBinding,
    pub meta: EntityMeta,
}

/// Relation from one entity type to another, named for use in `with` / `withCount`.
#[derive(Clone, Copy)]
pub struct Relation {
    pub name: &'static str,
    pub direction: IncludeDirection,
    /// Our column used in the join (our key for to_many; our foreign key for to_one).
    pub our_key: &'static str,
    /// Their column used in the join (their foreign key for to_many; their key for to_one).
    pub their_key: &'static str,
    related: fn(&Arc<dyn ConfigStore>) -> Result<RelatedTable, ConfigError>,
}

impl std::fmt::Debug for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("our_key", &self.our_key)
            .field("their_key", &self.their_key)
            .finish()
    }
}

impl Relation {
    pub fn to_many<R: ConfiguredEntity>(name: &'static str, our_key: &'static str, their_key: &'static str) -> Self {
        Relation {
            name,
            direction: IncludeDirection::ToMany,
            our_key,
            their_key,
            related: related_table::<R>,
        }
    }

    pub fn to_one<R: ConfiguredEntity>(name: &'static str, our_key: &'static str, their_key: &'static str) -> Self {
        Relation {
            name,
            direction: IncludeDirection::ToOne,
            our_key,
            their_key,
            related: related_table::<R>,
        }
    }

    pub fn resolve(&self, config: &Arc<dyn ConfigStore>) -> Result<RelatedTable, ConfigError> {
        (self.related)(config)
    }
}

fn related_table<R: ConfiguredEntity>(config: &Arc<dyn ConfigStore>) -> Result<RelatedTable, ConfigError> {
    Ok(RelatedTable {
        binding: TableBinding::of::<R>(config)?,
        meta: EntityMeta::of::<R>(),
    })
}

/// `name` or `schema.name`, letters/digits/underscore only.
pub fn is_valid_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("identifier pattern")
        })
        .is_match(name)
}
