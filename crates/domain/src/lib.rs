//! Domain layer for the storefront order core.
//!
//! This crate holds the rules that do not depend on storage:
//! - the Order aggregate and its status state machine
//! - Product inventory rules (reserve, release, sales count)
//! - Customer spend rules (credit, clamped debit)

pub mod aggregate;
pub mod customer;
pub mod order;
pub mod product;

pub use aggregate::Aggregate;
pub use common::{CustomerId, Money, OrderId, OrderItemId, ProductId, Version};
pub use customer::Customer;
pub use order::{
    Order, OrderError, OrderItem, OrderNumber, OrderParts, OrderStatus, ParseOrderStatusError,
    Revision,
};
pub use product::{InventoryError, Product};
