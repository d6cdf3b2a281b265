//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{OrderError, OrderItem, OrderNumber, OrderStatus};

/// Order aggregate root.
///
/// Holds the status state machine and the item list. Side effects on
/// inventory and customer spend are applied by the fulfillment service in the
/// same unit of work as the order change; this type only decides whether a
/// change is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    customer_id: CustomerId,
    status: OrderStatus,
    items: Vec<OrderItem>,
    total_amount: Money,
    #[serde(default)]
    version: Version,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// The stored fields of an order, used by stores to rebuild an [`Order`].
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a successful [`Order::revise`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    pub previous_status: OrderStatus,
    /// New total minus old total.
    pub total_delta: Money,
}

impl Aggregate for Order {
    type Id = OrderId;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> OrderId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Construction
impl Order {
    /// Places a new PENDING order.
    ///
    /// Every line must have a product name, a positive quantity and a positive
    /// unit price. The total is the sum of the line totals.
    pub fn place(customer_id: CustomerId, items: Vec<OrderItem>) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &items {
            validate_item(item)?;
        }

        let now = Utc::now();
        let total_amount = sum_lines(&items)?;

        Ok(Self {
            id: OrderId::new(),
            order_number: OrderNumber::generate(),
            customer_id,
            status: OrderStatus::Pending,
            items,
            total_amount,
            version: Version::initial(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an order from stored fields.
    pub fn from_parts(parts: OrderParts) -> Self {
        Self {
            id: parts.id,
            order_number: parts.order_number,
            customer_id: parts.customer_id,
            status: parts.status,
            items: parts.items,
            total_amount: parts.total_amount,
            version: parts.version,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }
}

// Query methods
impl Order {
    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the number of lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns the total quantity of all lines.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Returns the stored total amount.
    ///
    /// Equal to [`Order::line_total`] unless the total was revised.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Recomputes the total from the lines.
    pub fn line_total(&self) -> Result<Money, OrderError> {
        sum_lines(&self.items)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods
impl Order {
    pub fn process(&mut self) -> Result<(), OrderError> {
        self.transition_to(OrderStatus::Processing).map(|_| ())
    }

    pub fn ship(&mut self) -> Result<(), OrderError> {
        self.transition_to(OrderStatus::Shipped).map(|_| ())
    }

    pub fn deliver(&mut self) -> Result<(), OrderError> {
        self.transition_to(OrderStatus::Delivered).map(|_| ())
    }

    /// Marks the order cancelled. Only allowed from PENDING or PROCESSING.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        self.transition_to(OrderStatus::Cancelled).map(|_| ())
    }

    /// Moves the order to `target`, returning the previous status.
    pub fn transition_to(&mut self, target: OrderStatus) -> Result<OrderStatus, OrderError> {
        if !self.status.can_transition_to(target) {
            return Err(OrderError::InvalidStatus {
                current: self.status,
                action: target.action(),
            });
        }

        let previous = self.status;
        self.status = target;
        self.touch();
        Ok(previous)
    }

    /// Appends a line to a PENDING order and grows the total by its price.
    pub fn add_item(&mut self, item: OrderItem) -> Result<(), OrderError> {
        if !self.status.can_modify_items() {
            return Err(OrderError::InvalidStatus {
                current: self.status,
                action: "add items to",
            });
        }
        validate_item(&item)?;
        let total_amount = self
            .total_amount
            .checked_add(item.total_price()?)
            .ok_or(OrderError::AmountOverflow)?;

        self.total_amount = total_amount;
        self.items.push(item);
        self.touch();
        Ok(())
    }

    /// Revises the status and/or total of a PENDING order.
    ///
    /// A status change must be a legal transition (or a no-op) and may not be
    /// a cancellation. The total may be set to any non-negative amount.
    pub fn revise(
        &mut self,
        status: Option<OrderStatus>,
        total_amount: Option<Money>,
    ) -> Result<Revision, OrderError> {
        if !self.status.can_modify_items() {
            return Err(OrderError::InvalidStatus {
                current: self.status,
                action: "update",
            });
        }
        if let Some(target) = status {
            if target == OrderStatus::Cancelled {
                return Err(OrderError::RevisionCannotCancel);
            }
            if target != self.status && !self.status.can_transition_to(target) {
                return Err(OrderError::InvalidStatus {
                    current: self.status,
                    action: target.action(),
                });
            }
        }
        if let Some(total) = total_amount
            && total.is_negative()
        {
            return Err(OrderError::NegativeTotal {
                total: total.cents(),
            });
        }

        let revision = Revision {
            previous_status: self.status,
            total_delta: total_amount.map_or(Money::zero(), |t| t - self.total_amount),
        };
        if let Some(target) = status {
            self.status = target;
        }
        if let Some(total) = total_amount {
            self.total_amount = total;
        }
        self.touch();
        Ok(revision)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn validate_item(item: &OrderItem) -> Result<(), OrderError> {
    if item.product_name.trim().is_empty() {
        return Err(OrderError::BlankProductName);
    }
    if item.quantity == 0 {
        return Err(OrderError::InvalidQuantity {
            quantity: item.quantity,
        });
    }
    if !item.unit_price.is_positive() {
        return Err(OrderError::InvalidPrice {
            price: item.unit_price.cents(),
        });
    }
    Ok(())
}

fn sum_lines(items: &[OrderItem]) -> Result<Money, OrderError> {
    items.iter().try_fold(Money::zero(), |total, item| {
        total
            .checked_add(item.total_price()?)
            .ok_or(OrderError::AmountOverflow)
    })
}
