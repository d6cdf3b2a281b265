//! Value objects for the order domain.

use common::{Money, OrderItemId, ProductId};

use super::OrderError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Human-facing order reference, e.g. `ORD-3F2A9C1B`.
///
/// Generated once when the order is placed and never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    const PREFIX: &'static str = "ORD-";

    /// Generates a fresh order number from eight random uppercase hex digits.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", Self::PREFIX, hex[..8].to_ascii_uppercase()))
    }

    /// Wraps a number that was previously generated and stored.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A line of an order.
///
/// The product is linked by id. `product_name` and `unit_price` are
/// snapshots taken when the line was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,

    pub product_id: ProductId,

    /// Product name at the time the line was added.
    pub product_name: String,

    pub quantity: u32,

    /// Price per unit at the time the line was added.
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new order line with a fresh line id.
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            id: OrderItemId::new(),
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the total price for this line (quantity * unit_price).
    pub fn total_price(&self) -> Result<Money, OrderError> {
        self.unit_price
            .checked_multiply(self.quantity)
            .ok_or(OrderError::AmountOverflow)
    }
}
