//! Common test infrastructure
//!
//! Store fixtures shared by the end-to-end suites. Tests should only import
//! from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestStore, WIDGET_PRICE};
//! use shop_catalog_store::CatalogStore;
//!
//! #[test]
//! fn test_get_widget() {
//!     let fixture = TestStore::seeded();
//!     let widget = fixture.store.get_product(fixture.widget).unwrap().unwrap();
//!     assert_eq!(widget.price, WIDGET_PRICE);
//! }
//! ```

#![allow(dead_code)]

mod constants;
mod fixtures;

// Public API - this is what tests import
pub use constants::*;
pub use fixtures::{open_raw_connection, TestStore};
