//! Safe SQL builder and execution: identifiers quoted, values as parameters.

mod builder;
pub mod params;
mod pool;
mod query;
mod registry;
pub use builder::*;
pub use pool::*;
pub use query::*;
pub use registry::*;
