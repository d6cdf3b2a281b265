//! Product stock and sales ledger.
//!
//! Every operation comes in two forms. The `*_in` functions work inside a
//! caller's transaction so that stock moves commit or roll back together
//! with the order change they belong to. The methods on [`InventoryLedger`]
//! run the same operation in a transaction of their own and refresh the
//! product cache after committing.

use cache::{Cache, invalidation};
use common::ProductId;
use domain::Product;
use store::{Store, Transaction};

use crate::{Entity, FulfillmentError, Result};

fn ensure_positive(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(FulfillmentError::invalid_argument(
            "quantity must be positive",
        ));
    }
    Ok(())
}

/// Takes `quantity` units out of stock.
///
/// Fails with `OutOfStock` and leaves the product untouched if fewer units
/// remain.
pub async fn reserve_in(
    tx: &mut dyn Transaction,
    product_id: ProductId,
    quantity: u32,
) -> Result<Product> {
    ensure_positive(quantity)?;
    let product = tx.reserve_stock(product_id, quantity).await?;
    tracing::debug!(%product_id, quantity, stock = product.stock, "stock reserved");
    Ok(product)
}

/// Returns `quantity` units to stock.
pub async fn release_in(
    tx: &mut dyn Transaction,
    product_id: ProductId,
    quantity: u32,
) -> Result<Product> {
    ensure_positive(quantity)?;
    let product = tx.release_stock(product_id, quantity).await?;
    tracing::debug!(%product_id, quantity, stock = product.stock, "stock released");
    Ok(product)
}

pub async fn record_sale_in(
    tx: &mut dyn Transaction,
    product_id: ProductId,
    quantity: u32,
) -> Result<Product> {
    ensure_positive(quantity)?;
    Ok(tx.record_sale(product_id, quantity).await?)
}

/// Takes back a recorded sale. The sales count never drops below zero.
pub async fn revert_sale_in(
    tx: &mut dyn Transaction,
    product_id: ProductId,
    quantity: u32,
) -> Result<Product> {
    ensure_positive(quantity)?;
    Ok(tx.revert_sale(product_id, quantity).await?)
}

/// Stand-alone access to the stock ledger.
#[derive(Clone)]
pub struct InventoryLedger<S, C> {
    store: S,
    cache: C,
}

impl<S, C> InventoryLedger<S, C>
where
    S: Store + Clone,
    C: Cache + Clone,
{
    pub fn new(store: S, cache: C) -> Self {
        Self { store, cache }
    }

    /// Returns whether at least `quantity` units are in stock.
    pub async fn is_available(&self, product_id: ProductId, quantity: u32) -> Result<bool> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found(Entity::Product, product_id))?;
        Ok(product.is_available(quantity))
    }

    pub async fn reserve(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let product = reserve_in(tx.as_mut(), product_id, quantity).await?;
        self.commit(tx, &product).await?;
        Ok(product)
    }

    pub async fn release(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let product = release_in(tx.as_mut(), product_id, quantity).await?;
        self.commit(tx, &product).await?;
        Ok(product)
    }

    pub async fn record_sale(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let product = record_sale_in(tx.as_mut(), product_id, quantity).await?;
        self.commit(tx, &product).await?;
        Ok(product)
    }

    pub async fn revert_sale(&self, product_id: ProductId, quantity: u32) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        let product = revert_sale_in(tx.as_mut(), product_id, quantity).await?;
        self.commit(tx, &product).await?;
        Ok(product)
    }

    async fn commit(&self, tx: Box<dyn Transaction>, product: &Product) -> Result<()> {
        tx.commit().await?;
        invalidation::product_changed(&self.cache, product).await;
        Ok(())
    }
}
