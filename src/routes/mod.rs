//! Router builders.

mod common;
mod entity;
pub use common::{common_routes, common_routes_with_ready};
pub use entity::{entity_routes, MAX_BODY_BYTES};
