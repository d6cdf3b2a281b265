//! Catalog product with its inventory counters.

use common::{Money, ProductId, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::Aggregate;

/// Errors raised by inventory rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error(
        "Insufficient stock for {product_name}: requested {requested}, available {available}"
    )]
    OutOfStock {
        product_name: String,
        requested: u32,
        available: u32,
    },

    #[error("Stock for {product_name} would exceed the maximum")]
    StockOverflow { product_name: String },
}

/// A catalog product.
///
/// `stock` never goes negative and `sales_count` only decreases when a sale
/// is reverted by a cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Unique across the catalog.
    pub name: String,
    pub price: Money,
    pub stock: u32,
    pub sales_count: u64,
    #[serde(default)]
    pub version: Version,
}

impl Aggregate for Product {
    type Id = ProductId;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn id(&self) -> ProductId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

impl Product {
    /// Creates a new, unsaved product with no sales.
    pub fn new(name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock,
            sales_count: 0,
            version: Version::initial(),
        }
    }

    /// Returns true if at least `quantity` units are in stock.
    pub fn is_available(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Returns true if stock is positive but below `threshold`.
    pub fn is_low_stock(&self, threshold: u32) -> bool {
        self.stock > 0 && self.stock < threshold
    }

    /// Takes `quantity` units out of stock.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), InventoryError> {
        if !self.is_available(quantity) {
            return Err(InventoryError::OutOfStock {
                product_name: self.name.clone(),
                requested: quantity,
                available: self.stock,
            });
        }
        self.stock -= quantity;
        Ok(())
    }

    /// Returns `quantity` units to stock.
    pub fn release(&mut self, quantity: u32) -> Result<(), InventoryError> {
        self.stock =
            self.stock
                .checked_add(quantity)
                .ok_or_else(|| InventoryError::StockOverflow {
                    product_name: self.name.clone(),
                })?;
        Ok(())
    }

    pub fn record_sale(&mut self, quantity: u32) {
        self.sales_count = self.sales_count.saturating_add(u64::from(quantity));
    }

    /// Undoes a recorded sale. Saturates at zero.
    pub fn revert_sale(&mut self, quantity: u32) {
        self.sales_count = self.sales_count.saturating_sub(u64::from(quantity));
    }
}
