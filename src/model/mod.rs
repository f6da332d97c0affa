//! Configured entity types and their instances.

mod entity;
mod record;

pub use entity::*;
pub use record::{Record, TableBinding};
