//! SQLite schema definitions for the shop catalog database.
//!
//! Version 1 is the layout written by the legacy admin dashboard: a single
//! `products` table. Version 2 adds product images, customers and orders.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

// =============================================================================
// Version 1 - Dashboard products
// =============================================================================

const PRODUCTS_TABLE_V1: Table = Table {
    name: "products",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("price", &SqlType::Real, non_null = true),
        sqlite_column!("stock", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
    checks: &[],
};

// =============================================================================
// Version 2 - Images, customers and orders
// =============================================================================

const PRODUCTS_TABLE_V2: Table = Table {
    name: "products",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("price", &SqlType::Real, non_null = true),
        sqlite_column!("stock", &SqlType::Integer, non_null = true),
        sqlite_column!("image", &SqlType::Text), // path or URL
    ],
    indices: &[],
    unique_constraints: &[],
    checks: &["price >= 0", "stock >= 0"],
};

/// Email uniqueness is enforced by the store, so it can be turned off per database.
const CUSTOMERS_TABLE_V2: Table = Table {
    name: "customers",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("email", &SqlType::Text, non_null = true),
        sqlite_column!("city", &SqlType::Text),
    ],
    indices: &[("idx_customers_email", "email COLLATE NOCASE")],
    unique_constraints: &[],
    checks: &[],
};

const ORDER_CUSTOMER_FK: ForeignKey = ForeignKey {
    foreign_table: "customers",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const ORDER_PRODUCT_FK: ForeignKey = ForeignKey {
    foreign_table: "products",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const ORDERS_TABLE_V2: Table = Table {
    name: "orders",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_autoincrement = true
        ),
        sqlite_column!(
            "customer_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ORDER_CUSTOMER_FK)
        ),
        sqlite_column!(
            "product_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ORDER_PRODUCT_FK)
        ),
        sqlite_column!("quantity", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "order_date",
            &SqlType::Text,
            non_null = true,
            default_value = Some("(date('now'))")
        ), // YYYY-MM-DD
    ],
    indices: &[
        ("idx_orders_customer", "customer_id"),
        ("idx_orders_product", "product_id"),
    ],
    unique_constraints: &[],
    checks: &["quantity > 0"],
};

/// Rebuilds `products` with the v2 layout, keeping rows and the identity sequence.
///
/// SQLite cannot add CHECK constraints to an existing table, so the table is
/// recreated under a scratch name and renamed back. The dashboard accepted
/// negative prices and stock; those are clamped to zero on the way over.
fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    let sequence: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = 'products'",
            [],
            |r| r.get(0),
        )
        .optional()?;

    let negative_rows: i64 = conn.query_row(
        "SELECT COUNT(*) FROM products WHERE price < 0 OR stock < 0",
        [],
        |r| r.get(0),
    )?;
    if negative_rows > 0 {
        warn!(
            "Clamping negative price or stock to 0 on {} product(s) while migrating to version 2",
            negative_rows
        );
    }

    conn.execute(&PRODUCTS_TABLE_V2.create_sql("products_v2"), params![])?;
    conn.execute(
        "INSERT INTO products_v2 (id, name, price, stock, image)
         SELECT id, name, MAX(price, 0.0), MAX(stock, 0), NULL FROM products",
        params![],
    )?;
    conn.execute("DROP TABLE products", params![])?;
    conn.execute("ALTER TABLE products_v2 RENAME TO products", params![])?;

    if let Some(sequence) = sequence {
        conn.execute("DELETE FROM sqlite_sequence WHERE name = 'products'", params![])?;
        conn.execute(
            "INSERT INTO sqlite_sequence (name, seq) VALUES ('products', ?1)",
            params![sequence],
        )?;
    }

    CUSTOMERS_TABLE_V2.create(conn)?;
    ORDERS_TABLE_V2.create(conn)?;
    Ok(())
}

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[PRODUCTS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[PRODUCTS_TABLE_V2, CUSTOMERS_TABLE_V2, ORDERS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
