//! Shop Catalog Store Library
//!
//! Embedded SQLite persistence for a small shop: products, customers and
//! single-product orders, with atomic order placement.

pub mod catalog_store;
pub mod config;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use catalog_store::{
    CatalogError, CatalogResult, CatalogStore, ErrorKind, SqliteCatalogStore, StoreOptions,
};
