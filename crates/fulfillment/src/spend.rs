//! Running total of what each customer has spent.
//!
//! As with the inventory ledger, the `*_in` functions join a caller's
//! transaction and [`SpendTracker`] wraps each in a transaction of its own.

use common::{CustomerId, Money};
use domain::Customer;
use store::{Store, Transaction};

use crate::{Entity, FulfillmentError, Result};

fn ensure_non_negative(amount: Money) -> Result<()> {
    if amount.is_negative() {
        return Err(FulfillmentError::invalid_argument(format!(
            "amount must not be negative, got {amount}"
        )));
    }
    Ok(())
}

pub async fn credit_in(
    tx: &mut dyn Transaction,
    customer_id: CustomerId,
    amount: Money,
) -> Result<Customer> {
    ensure_non_negative(amount)?;
    let customer = tx.credit_spend(customer_id, amount).await?;
    tracing::debug!(%customer_id, %amount, total_spent = %customer.total_spent, "spend credited");
    Ok(customer)
}

/// Subtracts `amount` from the customer's spend.
///
/// The total floors at zero. Hitting the floor means the recorded spend and
/// the order history disagree, which is logged but not treated as an error.
pub async fn debit_in(
    tx: &mut dyn Transaction,
    customer_id: CustomerId,
    amount: Money,
) -> Result<Customer> {
    ensure_non_negative(amount)?;
    let current = tx
        .customer(customer_id)
        .await?
        .ok_or_else(|| FulfillmentError::not_found(Entity::Customer, customer_id))?;

    let (_, clamped) = current.total_spent.saturating_sub(amount);
    if clamped {
        tracing::warn!(
            %customer_id,
            total_spent = %current.total_spent,
            %amount,
            "debit exceeds recorded spend, flooring at zero"
        );
    }

    let customer = tx.debit_spend(customer_id, amount).await?;
    tracing::debug!(%customer_id, %amount, total_spent = %customer.total_spent, "spend debited");
    Ok(customer)
}

#[derive(Clone)]
pub struct SpendTracker<S> {
    store: S,
}

impl<S: Store + Clone> SpendTracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn credit(&self, customer_id: CustomerId, amount: Money) -> Result<Customer> {
        let mut tx = self.store.begin().await?;
        let customer = credit_in(tx.as_mut(), customer_id, amount).await?;
        tx.commit().await?;
        Ok(customer)
    }

    pub async fn debit(&self, customer_id: CustomerId, amount: Money) -> Result<Customer> {
        let mut tx = self.store.begin().await?;
        let customer = debit_in(tx.as_mut(), customer_id, amount).await?;
        tx.commit().await?;
        Ok(customer)
    }
}
