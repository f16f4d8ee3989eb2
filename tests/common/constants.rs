//! Shared constants for end-to-end tests
//!
//! When the seeded test data changes, update only this file.

// ============================================================================
// Seeded Products
// ============================================================================

pub const WIDGET_NAME: &str = "Widget";
pub const WIDGET_PRICE: f64 = 9.99;
pub const WIDGET_STOCK: i64 = 5;

pub const GADGET_NAME: &str = "Gadget";
pub const GADGET_PRICE: f64 = 24.5;
pub const GADGET_STOCK: i64 = 12;

// ============================================================================
// Seeded Customers
// ============================================================================

pub const ALICE_NAME: &str = "Alice";
pub const ALICE_EMAIL: &str = "alice@example.com";
pub const ALICE_CITY: &str = "Turin";

pub const BOB_NAME: &str = "Bob";
pub const BOB_EMAIL: &str = "bob@example.com";
