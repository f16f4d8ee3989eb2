//! CatalogStore trait definition.
//!
//! Callers receive the store as an injected handle (`Arc<dyn CatalogStore>`
//! or a clone of a concrete store); there is no process-wide connection.

use super::errors::CatalogResult;
use super::models::{
    CatalogSummary, Customer, CustomerDraft, CustomerId, Order, OrderId, Product, ProductDraft,
    ProductId,
};

/// Durable storage and consistent mutation of products, customers and orders.
pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Products
    // =========================================================================

    /// Adds a product and returns its freshly assigned identity.
    fn add_product(&self, product: &ProductDraft) -> CatalogResult<ProductId>;

    /// Replaces every field of an existing product.
    fn update_product(&self, id: ProductId, product: &ProductDraft) -> CatalogResult<()>;

    /// Deletes a product. Deleting an unknown (or already deleted) id fails
    /// with `NotFound`; a product still referenced by orders is a `Conflict`.
    fn delete_product(&self, id: ProductId) -> CatalogResult<()>;

    fn get_product(&self, id: ProductId) -> CatalogResult<Option<Product>>;

    /// All products, identity ascending.
    fn list_products(&self) -> CatalogResult<Vec<Product>>;

    // =========================================================================
    // Customers
    // =========================================================================

    fn add_customer(&self, customer: &CustomerDraft) -> CatalogResult<CustomerId>;

    fn update_customer(&self, id: CustomerId, customer: &CustomerDraft) -> CatalogResult<()>;

    fn delete_customer(&self, id: CustomerId) -> CatalogResult<()>;

    fn get_customer(&self, id: CustomerId) -> CatalogResult<Option<Customer>>;

    /// Case-insensitive lookup; surrounding whitespace is ignored.
    /// When duplicates are allowed, the lowest identity wins.
    fn find_customer_by_email(&self, email: &str) -> CatalogResult<Option<Customer>>;

    /// All customers, identity ascending.
    fn list_customers(&self) -> CatalogResult<Vec<Customer>>;

    // =========================================================================
    // Orders
    // =========================================================================

    /// Records an order dated today and decrements the product's stock by
    /// `quantity`, as a single all-or-nothing unit.
    fn place_order(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: i64,
    ) -> CatalogResult<OrderId>;

    fn get_order(&self, id: OrderId) -> CatalogResult<Option<Order>>;

    /// All orders, identity ascending.
    fn list_orders(&self) -> CatalogResult<Vec<Order>>;

    // =========================================================================
    // Dashboard
    // =========================================================================

    fn summary(&self) -> CatalogResult<CatalogSummary>;
}
