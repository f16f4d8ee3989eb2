//! SQLite-backed catalog store implementation.
//!
//! All mutations go through a single write connection and run inside a
//! `BEGIN IMMEDIATE` transaction. File-backed stores also keep a small pool of
//! read-only connections; with WAL journaling those only ever see committed
//! state.

use super::errors::{CatalogError, CatalogResult};
use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;
use super::validation::{non_blank, validate_customer, validate_product, validate_quantity};
use crate::sqlite_persistence::{read_schema_version, table_exists, write_schema_version};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::{
    params, types::Type, Connection, OpenFlags, OptionalExtension, Transaction,
    TransactionBehavior,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for opening a [`SqliteCatalogStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Read-only connections for file-backed stores. 0 routes reads through
    /// the write connection.
    pub read_pool_size: usize,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
    pub unique_customer_emails: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            read_pool_size: 4,
            busy_timeout: Duration::from_millis(5000),
            unique_customer_emails: true,
        }
    }
}

/// SQLite-backed catalog store.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Vec<Arc<Mutex<Connection>>>,
    read_index: Arc<AtomicUsize>,
    unique_customer_emails: bool,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let latest_schema = &CATALOG_VERSIONED_SCHEMAS[CATALOG_VERSIONED_SCHEMAS.len() - 1];

    let current_version = match read_schema_version(conn)? {
        Some(version) => version,
        None => {
            let table_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |r| r.get(0),
            )?;
            if table_count == 0 {
                info!(
                    "Creating catalog db schema at version {}",
                    latest_schema.version
                );
                let tx = conn.transaction()?;
                latest_schema.create(&tx)?;
                tx.commit()?;
                return Ok(());
            }
            // Unstamped database with a products table: written by the old dashboard
            if !table_exists(conn, "products")? {
                bail!("Database is not a catalog database (no version and no products table)");
            }
            CATALOG_VERSIONED_SCHEMAS[0].version
        }
    };

    if current_version > latest_schema.version {
        bail!(
            "Catalog database version {} is newer than the latest supported version {}",
            current_version,
            latest_schema.version
        );
    }

    let version_index = CATALOG_VERSIONED_SCHEMAS
        .iter()
        .position(|s| s.version == current_version)
        .with_context(|| format!("Unknown catalog database version {}", current_version))?;
    CATALOG_VERSIONED_SCHEMAS[version_index]
        .validate(conn)
        .with_context(|| {
            format!(
                "Catalog database schema validation failed for version {}",
                current_version
            )
        })?;

    if current_version == latest_schema.version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let mut migrated_version = current_version;
    for schema in CATALOG_VERSIONED_SCHEMAS.iter().skip(version_index + 1) {
        info!(
            "Migrating catalog db from version {} to {}",
            migrated_version, schema.version
        );
        if let Some(migration_fn) = schema.migration {
            migration_fn(&tx).with_context(|| {
                format!("Failed to run migration to version {}", schema.version)
            })?;
        }
        migrated_version = schema.version;
    }
    write_schema_version(&tx, migrated_version)?;
    tx.commit()?;

    latest_schema.validate(conn)
}

fn configure_connection(conn: &Connection, options: &StoreOptions) -> Result<()> {
    conn.busy_timeout(options.busy_timeout)?;
    conn.execute("PRAGMA foreign_keys = ON;", [])?;
    Ok(())
}

/// A panicking writer leaves no partial state behind (its transaction rolls
/// back on drop), so a poisoned connection is still usable.
fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SqliteCatalogStore {
    /// Opens (creating or migrating as needed) the catalog database at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P, options: &StoreOptions) -> Result<Self> {
        let db_path = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalog database at {:?}", db_path))?;
        configure_connection(&write_conn, options)?;

        migrate_if_needed(&mut write_conn)?;
        write_conn.pragma_update(None, "journal_mode", "WAL")?;

        let summary = query_summary(&write_conn)?;
        info!(
            "Opened catalog at {:?}: {} products ({} units), {} customers, {} orders",
            db_path,
            summary.product_count,
            summary.total_stock,
            summary.customer_count,
            summary.order_count
        );

        let mut read_pool = Vec::with_capacity(options.read_pool_size);
        for _ in 0..options.read_pool_size {
            let read_conn = Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            configure_connection(&read_conn, options)?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        Ok(Self {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
            unique_customer_emails: options.unique_customer_emails,
        })
    }

    /// Opens a private, empty in-memory catalog. Reads share the write connection.
    pub fn open_in_memory(options: &StoreOptions) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        configure_connection(&conn, options)?;
        migrate_if_needed(&mut conn)?;

        Ok(Self {
            write_conn: Arc::new(Mutex::new(conn)),
            read_pool: Vec::new(),
            read_index: Arc::new(AtomicUsize::new(0)),
            unique_customer_emails: options.unique_customer_emails,
        })
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        if self.read_pool.is_empty() {
            return self.write_conn.clone();
        }
        let index = self.read_index.fetch_add(1, Ordering::Relaxed) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    /// Runs `f` inside an immediate transaction on the write connection.
    ///
    /// Commits when `f` returns `Ok`; any other exit (error, early return,
    /// unwinding) drops the transaction, which rolls it back.
    fn with_write_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> CatalogResult<T>,
    ) -> CatalogResult<T> {
        let mut conn = lock(&self.write_conn);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn with_read_conn<T>(&self, f: impl FnOnce(&Connection) -> CatalogResult<T>) -> CatalogResult<T> {
        let read_conn = self.get_read_conn();
        let conn = lock(&read_conn);
        f(&conn)
    }

    // =========================================================================
    // Internal Helper Methods
    // =========================================================================

    fn row_exists(conn: &Connection, table: &str, id: i64) -> rusqlite::Result<bool> {
        conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table),
            params![id],
            |r| r.get(0),
        )
    }

    fn count_orders_referencing(conn: &Connection, column: &str, id: i64) -> rusqlite::Result<i64> {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM orders WHERE {} = ?1", column),
            params![id],
            |r| r.get(0),
        )
    }

    /// Id of a customer other than `excluding` already using `email`.
    fn customer_with_email(
        conn: &Connection,
        email: &str,
        excluding: Option<CustomerId>,
    ) -> rusqlite::Result<Option<i64>> {
        conn.query_row(
            "SELECT id FROM customers
             WHERE email = ?1 COLLATE NOCASE AND id != ?2
             ORDER BY id LIMIT 1",
            params![email, excluding.map(|id| id.0).unwrap_or(-1)],
            |r| r.get(0),
        )
        .optional()
    }

    fn ensure_unique_email(
        &self,
        conn: &Connection,
        email: &str,
        excluding: Option<CustomerId>,
    ) -> CatalogResult<()> {
        if !self.unique_customer_emails {
            return Ok(());
        }
        if let Some(other_id) = Self::customer_with_email(conn, email, excluding)? {
            return Err(CatalogError::Conflict(format!(
                "email '{}' is already used by customer {}",
                email, other_id
            )));
        }
        Ok(())
    }

    fn parse_product_row(row: &rusqlite::Row) -> rusqlite::Result<Product> {
        Ok(Product {
            id: ProductId(row.get(0)?),
            name: row.get(1)?,
            price: row.get(2)?,
            stock: row.get(3)?,
            image: row.get(4)?,
        })
    }

    fn parse_customer_row(row: &rusqlite::Row) -> rusqlite::Result<Customer> {
        Ok(Customer {
            id: CustomerId(row.get(0)?),
            name: row.get(1)?,
            email: row.get(2)?,
            city: row.get(3)?,
        })
    }

    fn parse_order_row(row: &rusqlite::Row) -> rusqlite::Result<Order> {
        let order_date: String = row.get(4)?;
        let order_date = NaiveDate::parse_from_str(&order_date, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
        Ok(Order {
            id: OrderId(row.get(0)?),
            customer_id: CustomerId(row.get(1)?),
            product_id: ProductId(row.get(2)?),
            quantity: row.get(3)?,
            order_date,
        })
    }
}

const PRODUCT_COLUMNS: &str = "id, name, price, stock, image";
const CUSTOMER_COLUMNS: &str = "id, name, email, city";
const ORDER_COLUMNS: &str = "id, customer_id, product_id, quantity, order_date";

/// One statement, so the figures come from a single snapshot.
fn query_summary(conn: &Connection) -> rusqlite::Result<CatalogSummary> {
    conn.query_row(
        "SELECT (SELECT COUNT(*) FROM products),
                (SELECT COALESCE(SUM(stock), 0) FROM products),
                (SELECT COUNT(*) FROM customers),
                (SELECT COUNT(*) FROM orders)",
        [],
        |r| {
            Ok(CatalogSummary {
                product_count: r.get::<_, i64>(0)? as usize,
                total_stock: r.get(1)?,
                customer_count: r.get::<_, i64>(2)? as usize,
                order_count: r.get::<_, i64>(3)? as usize,
            })
        },
    )
}

impl CatalogStore for SqliteCatalogStore {
    // =========================================================================
    // Products
    // =========================================================================

    fn add_product(&self, product: &ProductDraft) -> CatalogResult<ProductId> {
        validate_product(product)?;
        let id = self.with_write_transaction(|tx| {
            tx.execute(
                "INSERT INTO products (name, price, stock, image) VALUES (?1, ?2, ?3, ?4)",
                params![
                    product.name.trim(),
                    product.price,
                    product.stock,
                    non_blank(product.image.as_deref())
                ],
            )?;
            Ok(ProductId(tx.last_insert_rowid()))
        })?;
        debug!("Added product {} '{}'", id, product.name.trim());
        Ok(id)
    }

    fn update_product(&self, id: ProductId, product: &ProductDraft) -> CatalogResult<()> {
        validate_product(product)?;
        self.with_write_transaction(|tx| {
            let updated = tx.execute(
                "UPDATE products SET name = ?1, price = ?2, stock = ?3, image = ?4 WHERE id = ?5",
                params![
                    product.name.trim(),
                    product.price,
                    product.stock,
                    non_blank(product.image.as_deref()),
                    id.0
                ],
            )?;
            if updated == 0 {
                return Err(CatalogError::not_found(EntityKind::Product, id.0));
            }
            Ok(())
        })?;
        debug!("Updated product {}", id);
        Ok(())
    }

    fn delete_product(&self, id: ProductId) -> CatalogResult<()> {
        self.with_write_transaction(|tx| {
            if !Self::row_exists(tx, "products", id.0)? {
                return Err(CatalogError::not_found(EntityKind::Product, id.0));
            }
            let order_count = Self::count_orders_referencing(tx, "product_id", id.0)?;
            if order_count > 0 {
                return Err(CatalogError::Conflict(format!(
                    "product {} is referenced by {} order(s)",
                    id, order_count
                )));
            }
            tx.execute("DELETE FROM products WHERE id = ?1", params![id.0])?;
            Ok(())
        })?;
        debug!("Deleted product {}", id);
        Ok(())
    }

    fn get_product(&self, id: ProductId) -> CatalogResult<Option<Product>> {
        self.with_read_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM products WHERE id = ?1",
                PRODUCT_COLUMNS
            ))?;
            Ok(stmt
                .query_row(params![id.0], Self::parse_product_row)
                .optional()?)
        })
    }

    fn list_products(&self) -> CatalogResult<Vec<Product>> {
        self.with_read_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM products ORDER BY id ASC",
                PRODUCT_COLUMNS
            ))?;
            let products = stmt
                .query_map([], Self::parse_product_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(products)
        })
    }

    // =========================================================================
    // Customers
    // =========================================================================

    fn add_customer(&self, customer: &CustomerDraft) -> CatalogResult<CustomerId> {
        validate_customer(customer)?;
        let email = customer.email.trim();
        let id = self.with_write_transaction(|tx| {
            self.ensure_unique_email(tx, email, None)?;
            tx.execute(
                "INSERT INTO customers (name, email, city) VALUES (?1, ?2, ?3)",
                params![
                    customer.name.trim(),
                    email,
                    non_blank(customer.city.as_deref())
                ],
            )?;
            Ok(CustomerId(tx.last_insert_rowid()))
        })?;
        debug!("Added customer {} <{}>", id, email);
        Ok(id)
    }

    fn update_customer(&self, id: CustomerId, customer: &CustomerDraft) -> CatalogResult<()> {
        validate_customer(customer)?;
        let email = customer.email.trim();
        self.with_write_transaction(|tx| {
            if !Self::row_exists(tx, "customers", id.0)? {
                return Err(CatalogError::not_found(EntityKind::Customer, id.0));
            }
            self.ensure_unique_email(tx, email, Some(id))?;
            tx.execute(
                "UPDATE customers SET name = ?1, email = ?2, city = ?3 WHERE id = ?4",
                params![
                    customer.name.trim(),
                    email,
                    non_blank(customer.city.as_deref()),
                    id.0
                ],
            )?;
            Ok(())
        })?;
        debug!("Updated customer {}", id);
        Ok(())
    }

    fn delete_customer(&self, id: CustomerId) -> CatalogResult<()> {
        self.with_write_transaction(|tx| {
            if !Self::row_exists(tx, "customers", id.0)? {
                return Err(CatalogError::not_found(EntityKind::Customer, id.0));
            }
            let order_count = Self::count_orders_referencing(tx, "customer_id", id.0)?;
            if order_count > 0 {
                return Err(CatalogError::Conflict(format!(
                    "customer {} is referenced by {} order(s)",
                    id, order_count
                )));
            }
            tx.execute("DELETE FROM customers WHERE id = ?1", params![id.0])?;
            Ok(())
        })?;
        debug!("Deleted customer {}", id);
        Ok(())
    }

    fn get_customer(&self, id: CustomerId) -> CatalogResult<Option<Customer>> {
        self.with_read_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM customers WHERE id = ?1",
                CUSTOMER_COLUMNS
            ))?;
            Ok(stmt
                .query_row(params![id.0], Self::parse_customer_row)
                .optional()?)
        })
    }

    fn find_customer_by_email(&self, email: &str) -> CatalogResult<Option<Customer>> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(None);
        }
        self.with_read_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM customers WHERE email = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
                CUSTOMER_COLUMNS
            ))?;
            Ok(stmt
                .query_row(params![email], Self::parse_customer_row)
                .optional()?)
        })
    }

    fn list_customers(&self) -> CatalogResult<Vec<Customer>> {
        self.with_read_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM customers ORDER BY id ASC",
                CUSTOMER_COLUMNS
            ))?;
            let customers = stmt
                .query_map([], Self::parse_customer_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(customers)
        })
    }

    // =========================================================================
    // Orders
    // =========================================================================

    fn place_order(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: i64,
    ) -> CatalogResult<OrderId> {
        validate_quantity(quantity)?;
        let order_id = self.with_write_transaction(|tx| {
            if !Self::row_exists(tx, "customers", customer_id.0)? {
                return Err(CatalogError::not_found(EntityKind::Customer, customer_id.0));
            }
            let available: i64 = tx
                .query_row(
                    "SELECT stock FROM products WHERE id = ?1",
                    params![product_id.0],
                    |r| r.get(0),
                )
                .optional()?
                .ok_or_else(|| CatalogError::not_found(EntityKind::Product, product_id.0))?;
            if quantity > available {
                warn!(
                    "Refused order of {} x product {} for customer {}: only {} in stock",
                    quantity, product_id, customer_id, available
                );
                return Err(CatalogError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available,
                });
            }

            tx.execute(
                "INSERT INTO orders (customer_id, product_id, quantity) VALUES (?1, ?2, ?3)",
                params![customer_id.0, product_id.0, quantity],
            )?;
            let order_id = OrderId(tx.last_insert_rowid());

            // Conditional, so a writer outside this process can never drive stock below zero
            let decremented = tx.execute(
                "UPDATE products SET stock = stock - ?1 WHERE id = ?2 AND stock >= ?1",
                params![quantity, product_id.0],
            )?;
            if decremented != 1 {
                let available: i64 = tx.query_row(
                    "SELECT stock FROM products WHERE id = ?1",
                    params![product_id.0],
                    |r| r.get(0),
                )?;
                return Err(CatalogError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available,
                });
            }
            Ok(order_id)
        })?;
        debug!(
            "Placed order {}: {} x product {} for customer {}",
            order_id, quantity, product_id, customer_id
        );
        Ok(order_id)
    }

    fn get_order(&self, id: OrderId) -> CatalogResult<Option<Order>> {
        self.with_read_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM orders WHERE id = ?1",
                ORDER_COLUMNS
            ))?;
            Ok(stmt
                .query_row(params![id.0], Self::parse_order_row)
                .optional()?)
        })
    }

    fn list_orders(&self) -> CatalogResult<Vec<Order>> {
        self.with_read_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM orders ORDER BY id ASC",
                ORDER_COLUMNS
            ))?;
            let orders = stmt
                .query_map([], Self::parse_order_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(orders)
        })
    }

    // =========================================================================
    // Dashboard
    // =========================================================================

    fn summary(&self) -> CatalogResult<CatalogSummary> {
        self.with_read_conn(|conn| Ok(query_summary(conn)?))
    }
}
