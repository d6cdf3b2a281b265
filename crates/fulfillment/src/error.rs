//! Fulfillment error types.

use domain::{InventoryError, OrderError, OrderStatus};
use store::StoreError;
use thiserror::Error;

/// The kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Customer,
    Product,
    Order,
}

impl Entity {
    fn from_aggregate_type(name: &str) -> Option<Self> {
        match name {
            "Customer" => Some(Entity::Customer),
            "Product" => Some(Entity::Product),
            "Order" => Some(Entity::Order),
            _ => None,
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Customer => "Customer",
            Entity::Product => "Product",
            Entity::Order => "Order",
        };
        f.write_str(name)
    }
}

/// Errors returned by fulfillment operations.
///
/// Every error leaves storage unchanged: the operation's transaction is
/// rolled back before the error is returned.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: Entity, key: String },

    #[error(
        "Insufficient stock for {product_name}: requested {requested}, available {available}"
    )]
    OutOfStock {
        product_name: String,
        requested: u32,
        available: u32,
    },

    #[error("Cannot {attempted_action} order in {current} status")]
    InvalidOrderStatus {
        current: OrderStatus,
        attempted_action: &'static str,
    },

    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A concurrent update won and retries were exhausted.
    #[error("Conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl FulfillmentError {
    pub fn not_found(entity: Entity, key: impl ToString) -> Self {
        FulfillmentError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        FulfillmentError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, FulfillmentError::Conflict(_))
    }

    /// Maps a failed order insert.
    ///
    /// A new order only collides on its generated order number, so a
    /// duplicate is retryable: the next attempt generates a fresh number.
    pub(crate) fn from_order_insert(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { entity, key } => {
                FulfillmentError::Conflict(format!("{entity} already taken: {key}"))
            }
            other => other.into(),
        }
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(err: StoreError) -> Self {
        if err.is_retryable() {
            return FulfillmentError::Conflict(err.to_string());
        }
        match err {
            StoreError::NotFound { entity, id } => match Entity::from_aggregate_type(entity) {
                Some(entity) => FulfillmentError::NotFound { entity, key: id },
                None => FulfillmentError::Storage(StoreError::NotFound { entity, id }),
            },
            StoreError::InsufficientStock {
                product_name,
                requested,
                available,
            } => FulfillmentError::OutOfStock {
                product_name,
                requested,
                available,
            },
            StoreError::Duplicate { entity, key } => {
                FulfillmentError::invalid_argument(format!("{entity} already exists: {key}"))
            }
            other => FulfillmentError::Storage(other),
        }
    }
}

impl From<OrderError> for FulfillmentError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidStatus { current, action } => {
                FulfillmentError::InvalidOrderStatus {
                    current,
                    attempted_action: action,
                }
            }
            other => FulfillmentError::invalid_argument(other.to_string()),
        }
    }
}

impl From<InventoryError> for FulfillmentError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::OutOfStock {
                product_name,
                requested,
                available,
            } => FulfillmentError::OutOfStock {
                product_name,
                requested,
                available,
            },
            other => FulfillmentError::invalid_argument(other.to_string()),
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::Version;

    #[test]
    fn store_not_found_keeps_entity() {
        let err: FulfillmentError = StoreError::NotFound {
            entity: "Customer",
            id: "c-1".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            FulfillmentError::NotFound {
                entity: Entity::Customer,
                ..
            }
        ));
        assert_eq!(err.to_string(), "Customer not found: c-1");
    }

    #[test]
    fn version_conflicts_become_retryable_conflicts() {
        let err: FulfillmentError = StoreError::ConcurrencyConflict {
            entity: "Order",
            id: "o-1".to_string(),
            expected: Version::new(1),
            actual: Version::new(2),
        }
        .into();
        assert!(err.is_conflict());

        let aborted: FulfillmentError = StoreError::TransactionAborted("deadlock".into()).into();
        assert!(aborted.is_conflict());
    }

    #[test]
    fn order_number_collision_is_retryable() {
        let duplicate = || StoreError::Duplicate {
            entity: "order number",
            key: "ORD-0000BEEF".to_string(),
        };

        let err = FulfillmentError::from_order_insert(duplicate());
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "Conflicting concurrent update: order number already taken: ORD-0000BEEF"
        );

        let plain: FulfillmentError = duplicate().into();
        assert!(!plain.is_conflict());
        assert!(!FulfillmentError::from_order_insert(StoreError::InvalidData("x".into())).is_conflict());
    }

    #[test]
    fn order_status_error_carries_action() {
        let err: FulfillmentError = OrderError::InvalidStatus {
            current: OrderStatus::Cancelled,
            action: "cancel",
        }
        .into();
        assert_eq!(err.to_string(), "Cannot cancel order in CANCELLED status");
    }

    #[test]
    fn validation_errors_are_invalid_arguments() {
        let err: FulfillmentError = OrderError::NoItems.into();
        assert!(matches!(err, FulfillmentError::InvalidArgument { .. }));
    }
}
