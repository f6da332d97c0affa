//! Generic CRUD services over configured entities.

mod crud;
mod options;
mod page;
pub use crud::{CrudService, ModelService};
pub use options::{apply_query_options, QueryCallback, QueryOptions};
pub use page::Page;
