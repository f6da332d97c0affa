pub mod store;
pub mod loader;
pub mod resolver;

pub use store::*;
pub use loader::*;
pub use resolver::*;
