//! Atlas core: configuration-driven table and connection resolution for entity types, and
//! a generic CRUD service over them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;

pub use config::{ConfigRepository, ConfigStore, ResourceNameResolver};
pub use error::{AppError, ConfigError};
pub use model::{ConfiguredEntity, KeyType, Record, Relation, TableBinding};
pub use response::{success_many, success_one, success_page};
pub use routes::{common_routes, common_routes_with_ready, entity_routes};
pub use service::{CrudService, ModelService, Page, QueryOptions};
pub use sql::{ensure_database_exists, Columns, ConnectionRegistry, DbPool, Query, SortOrder};
pub use state::AppState;
