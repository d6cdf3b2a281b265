//! Order aggregate and related types.

mod aggregate;
mod state;
mod value_objects;

pub use aggregate::{Order, OrderParts, Revision};
pub use state::{OrderStatus, ParseOrderStatusError};
pub use value_objects::{OrderItem, OrderNumber};

use thiserror::Error;

/// Errors that can occur during order operations.
///
/// A rejected operation leaves the order unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The order's status does not allow the requested action.
    #[error("Cannot {action} order in {current} status")]
    InvalidStatus {
        current: OrderStatus,
        action: &'static str,
    },

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: i64 },

    #[error("Product name is required")]
    BlankProductName,

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// A line or order total does not fit in the money range.
    #[error("Order total exceeds the largest supported amount")]
    AmountOverflow,

    #[error("Order total cannot be negative: {total}")]
    NegativeTotal { total: i64 },

    /// Cancellation has its own path because it must reverse inventory and spend.
    #[error("Orders are cancelled through cancellation, not revision")]
    RevisionCannotCancel,
}
