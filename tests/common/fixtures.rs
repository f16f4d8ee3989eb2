//! Store fixtures for end-to-end tests

use super::constants::*;
use rusqlite::Connection;
use shop_catalog_store::catalog_store::{
    CatalogStore, CustomerDraft, CustomerId, ProductDraft, ProductId, SqliteCatalogStore,
    StoreOptions,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A catalog store under test, optionally backed by a file in a temp dir.
///
/// The temp dir is kept alive for as long as the fixture is.
pub struct TestStore {
    pub store: SqliteCatalogStore,
    pub widget: ProductId,
    pub gadget: ProductId,
    pub alice: CustomerId,
    pub bob: CustomerId,
    _temp_dir: Option<TempDir>,
    db_path: Option<PathBuf>,
}

impl TestStore {
    /// An empty in-memory store with default options.
    pub fn empty() -> SqliteCatalogStore {
        Self::empty_with(&StoreOptions::default())
    }

    pub fn empty_with(options: &StoreOptions) -> SqliteCatalogStore {
        SqliteCatalogStore::open_in_memory(options).expect("Failed to open in-memory store")
    }

    /// In-memory store holding Widget, Gadget, Alice and Bob.
    pub fn seeded() -> Self {
        Self::seed(Self::empty(), None)
    }

    /// File-backed store with the same seed data, for tests that need
    /// several connections to the same database.
    pub fn seeded_on_disk() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("catalog.db");
        let store = SqliteCatalogStore::open(&db_path, &StoreOptions::default())
            .expect("Failed to open file store");
        Self::seed(store, Some((temp_dir, db_path)))
    }

    fn seed(store: SqliteCatalogStore, disk: Option<(TempDir, PathBuf)>) -> Self {
        let widget = store
            .add_product(&ProductDraft::new(WIDGET_NAME, WIDGET_PRICE, WIDGET_STOCK))
            .expect("Failed to add widget");
        let gadget = store
            .add_product(
                &ProductDraft::new(GADGET_NAME, GADGET_PRICE, GADGET_STOCK)
                    .with_image("https://img.example.com/gadget.png"),
            )
            .expect("Failed to add gadget");
        let alice = store
            .add_customer(&CustomerDraft::new(ALICE_NAME, ALICE_EMAIL).with_city(ALICE_CITY))
            .expect("Failed to add alice");
        let bob = store
            .add_customer(&CustomerDraft::new(BOB_NAME, BOB_EMAIL))
            .expect("Failed to add bob");

        let (temp_dir, db_path) = match disk {
            Some((temp_dir, db_path)) => (Some(temp_dir), Some(db_path)),
            None => (None, None),
        };
        Self {
            store,
            widget,
            gadget,
            alice,
            bob,
            _temp_dir: temp_dir,
            db_path,
        }
    }

    /// Path of the database file, for on-disk fixtures.
    pub fn db_path(&self) -> &PathBuf {
        self.db_path
            .as_ref()
            .expect("db_path is only available for on-disk fixtures")
    }

    pub fn stock_of(&self, id: ProductId) -> i64 {
        self.store
            .get_product(id)
            .unwrap()
            .expect("product should exist")
            .stock
    }
}

/// Opens a connection to the database that bypasses the store entirely.
pub fn open_raw_connection(path: &Path) -> Connection {
    let conn = Connection::open(path).expect("Failed to open raw connection");
    conn.busy_timeout(std::time::Duration::from_secs(5)).unwrap();
    conn
}
