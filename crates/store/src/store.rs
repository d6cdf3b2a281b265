use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, ProductId, Version};
use domain::{Customer, Order, OrderStatus, Product};

use crate::Result;

/// Core storage trait.
///
/// Reads on the store itself see committed data only. Writes that must be
/// atomic with other writes go through a [`Transaction`] opened by
/// [`Store::begin`]. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Opens a unit of work.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>>;

    /// Returns every product, ordered by name.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Inserts or updates a product with compare-and-swap on its version.
    ///
    /// A product at [`Version::initial`] is inserted; any other version must
    /// match the stored one. Returns the new stored version.
    async fn save_product(&self, product: &Product) -> Result<Version>;

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>>;

    /// Inserts or updates a customer, with the same version rules as
    /// [`Store::save_product`].
    async fn save_customer(&self, customer: &Customer) -> Result<Version>;

    /// Loads an order together with its items.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>>;

    /// Returns the customer's orders, newest first.
    async fn find_orders_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>>;

    /// Returns every order, newest first.
    async fn list_orders(&self) -> Result<Vec<Order>>;

    /// Returns orders in `status`, newest first.
    async fn find_orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>>;

    /// Returns orders whose total is strictly greater than `amount`, newest first.
    async fn find_orders_above_amount(&self, amount: Money) -> Result<Vec<Order>>;
}

/// A unit of work against the store.
///
/// Reads lock the returned row until the transaction ends, so a
/// read-check-write sequence cannot interleave with another transaction on
/// the same row. Dropping the transaction without calling
/// [`Transaction::commit`] discards every change.
#[async_trait]
pub trait Transaction: Send {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>>;

    async fn product_by_name(&mut self, name: &str) -> Result<Option<Product>>;

    async fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>>;

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Decrements stock by `quantity`.
    ///
    /// Fails with `InsufficientStock` and changes nothing if fewer than
    /// `quantity` units remain.
    async fn reserve_stock(&mut self, id: ProductId, quantity: u32) -> Result<Product>;

    async fn release_stock(&mut self, id: ProductId, quantity: u32) -> Result<Product>;

    async fn record_sale(&mut self, id: ProductId, quantity: u32) -> Result<Product>;

    /// Decrements the sales count, saturating at zero.
    async fn revert_sale(&mut self, id: ProductId, quantity: u32) -> Result<Product>;

    async fn credit_spend(&mut self, id: CustomerId, amount: Money) -> Result<Customer>;

    /// Subtracts `amount` from the customer's spend, flooring at zero.
    async fn debit_spend(&mut self, id: CustomerId, amount: Money) -> Result<Customer>;

    /// Inserts a new order and its items. Returns the stored version.
    async fn insert_order(&mut self, order: &Order) -> Result<Version>;

    /// Writes the order's status, total and any new items.
    ///
    /// Fails with `ConcurrencyConflict` unless the stored version equals
    /// `order.version()`. Returns the new version.
    async fn update_order(&mut self, order: &Order) -> Result<Version>;

    /// Deletes an order and its items.
    async fn delete_order(&mut self, id: OrderId) -> Result<()>;

    /// Makes every change of this transaction visible at once.
    async fn commit(self: Box<Self>) -> Result<()>;
}
