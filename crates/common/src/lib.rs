//! Shared types for the storefront order core.
//!
//! Identifiers are UUID newtypes so an order id can never be passed where a
//! product id is expected. Monetary amounts are fixed-point cents.

mod money;
mod types;

pub use money::Money;
pub use types::{CustomerId, OrderId, OrderItemId, ProductId, Version};
