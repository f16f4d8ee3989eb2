mod errors;
mod models;
mod schema;
mod store;
mod trait_def;
mod validation;

pub use errors::{CatalogError, CatalogResult, ErrorKind};
pub use models::*;
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::{SqliteCatalogStore, StoreOptions};
pub use trait_def::CatalogStore;
pub use validation::ValidationError;
