//! Order lifecycle operations.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use cache::{Cache, invalidation};
use common::{CustomerId, Money, OrderId, ProductId};
use domain::{Aggregate, Customer, Order, OrderItem, OrderStatus, Product};
use serde::{Deserialize, Serialize};
use store::{Store, Transaction};

use crate::retry::{RetryPolicy, retry_on_conflict};
use crate::{Entity, FulfillmentError, InventoryLedger, Result, SpendTracker, inventory, spend};

/// One requested line of a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn new(product_name: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.product_name.trim().is_empty() {
            return Err(FulfillmentError::invalid_argument(
                "product name must not be blank",
            ));
        }
        if self.quantity == 0 {
            return Err(FulfillmentError::invalid_argument(format!(
                "quantity for {} must be positive",
                self.product_name
            )));
        }
        if !self.unit_price.is_positive() {
            return Err(FulfillmentError::invalid_argument(format!(
                "unit price for {} must be positive, got {}",
                self.product_name, self.unit_price
            )));
        }
        Ok(())
    }
}

/// A partial update of a PENDING order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRevision {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub total_amount: Option<Money>,
}

#[derive(Debug, Clone, Default)]
pub struct FulfillmentConfig {
    pub retry: RetryPolicy,
}

impl FulfillmentConfig {
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.retry = self.retry.with_max_retries(retries);
        self
    }
}

/// Products whose stock or sales changed in a committed operation.
type Touched = Vec<(ProductId, String)>;

/// Coordinates orders, inventory, and customer spend.
///
/// Each mutating operation is one store transaction. Rows are locked in a
/// fixed order (order, then customer, then products by name) so that
/// concurrent operations queue instead of deadlocking. The cache is only
/// touched after a successful commit.
#[derive(Clone)]
pub struct FulfillmentService<S, C> {
    pub(crate) store: S,
    pub(crate) cache: C,
    inventory: InventoryLedger<S, C>,
    spend: SpendTracker<S>,
    config: FulfillmentConfig,
}

impl<S, C> FulfillmentService<S, C>
where
    S: Store + Clone,
    C: Cache + Clone,
{
    pub fn new(store: S, cache: C) -> Self {
        Self::with_config(store, cache, FulfillmentConfig::default())
    }

    pub fn with_config(store: S, cache: C, config: FulfillmentConfig) -> Self {
        Self {
            inventory: InventoryLedger::new(store.clone(), cache.clone()),
            spend: SpendTracker::new(store.clone()),
            store,
            cache,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn inventory(&self) -> &InventoryLedger<S, C> {
        &self.inventory
    }

    pub fn spend(&self) -> &SpendTracker<S> {
        &self.spend
    }

    /// Places an order for `customer_id`.
    ///
    /// Either everything happens (order stored as PENDING, stock reserved,
    /// sales recorded, spend credited) or nothing does.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn create_order(&self, customer_id: CustomerId, lines: Vec<OrderLine>) -> Result<Order> {
        let start = Instant::now();
        if lines.is_empty() {
            return Err(FulfillmentError::invalid_argument(
                "order must have at least one item",
            ));
        }
        for line in &lines {
            line.validate()?;
        }

        let (order, touched) = retry_on_conflict(&self.config.retry, "create_order", || {
            self.try_create_order(customer_id, &lines)
        })
        .await
        .inspect_err(|e| tracing::warn!(%customer_id, error = %e, "order creation failed"))?;

        invalidation::order_changed(&self.cache, &order, None).await;
        invalidation::products_changed(&self.cache, &touched).await;

        metrics::counter!("orders_created_total").increment(1);
        record_duration("create_order", start);
        tracing::info!(
            order_id = %order.id(),
            order_number = %order.order_number(),
            total = %order.total_amount(),
            items = order.item_count(),
            "order created"
        );
        Ok(order)
    }

    async fn try_create_order(
        &self,
        customer_id: CustomerId,
        lines: &[OrderLine],
    ) -> Result<(Order, Touched)> {
        let mut tx = self.store.begin().await?;
        lock_customer(tx.as_mut(), customer_id).await?;

        let mut demand: BTreeMap<&str, u32> = BTreeMap::new();
        for line in lines {
            let total = demand.entry(line.product_name.as_str()).or_default();
            *total = total.checked_add(line.quantity).ok_or_else(|| {
                FulfillmentError::invalid_argument(format!(
                    "quantity for {} is too large",
                    line.product_name
                ))
            })?;
        }

        let mut products: HashMap<&str, Product> = HashMap::with_capacity(demand.len());
        for (&name, &quantity) in &demand {
            let product = tx
                .product_by_name(name)
                .await?
                .ok_or_else(|| FulfillmentError::not_found(Entity::Product, name))?;
            if !product.is_available(quantity) {
                return Err(FulfillmentError::OutOfStock {
                    product_name: product.name,
                    requested: quantity,
                    available: product.stock,
                });
            }
            products.insert(name, product);
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = products
                .get(line.product_name.as_str())
                .ok_or_else(|| FulfillmentError::not_found(Entity::Product, &line.product_name))?;
            items.push(OrderItem::new(
                product.id,
                &line.product_name,
                line.quantity,
                line.unit_price,
            ));
        }
        let mut order = Order::place(customer_id, items)?;
        let version = tx
            .insert_order(&order)
            .await
            .map_err(FulfillmentError::from_order_insert)?;
        order.set_version(version);

        let mut touched = Touched::with_capacity(demand.len());
        for (name, quantity) in demand {
            let Some(product) = products.get(name) else {
                continue;
            };
            inventory::reserve_in(tx.as_mut(), product.id, quantity).await?;
            inventory::record_sale_in(tx.as_mut(), product.id, quantity).await?;
            touched.push((product.id, product.name.clone()));
        }
        spend::credit_in(tx.as_mut(), customer_id, order.total_amount()).await?;

        tx.commit().await?;
        Ok((order, touched))
    }

    /// Cancels a PENDING or PROCESSING order.
    ///
    /// Stock is returned, sales are taken back, and the order total is
    /// debited from the customer's spend. Items whose product no longer
    /// exists are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let start = Instant::now();
        let (order, previous, touched) =
            retry_on_conflict(&self.config.retry, "cancel_order", || {
                self.try_cancel_order(order_id)
            })
            .await
            .inspect_err(|e| tracing::warn!(%order_id, error = %e, "order cancellation failed"))?;

        invalidation::order_changed(&self.cache, &order, Some(previous)).await;
        invalidation::products_changed(&self.cache, &touched).await;

        metrics::counter!("orders_cancelled_total").increment(1);
        record_duration("cancel_order", start);
        tracing::info!(
            order_number = %order.order_number(),
            %previous,
            refunded = %order.total_amount(),
            "order cancelled"
        );
        Ok(order)
    }

    async fn try_cancel_order(&self, order_id: OrderId) -> Result<(Order, OrderStatus, Touched)> {
        let mut tx = self.store.begin().await?;
        let mut order = lock_order(tx.as_mut(), order_id).await?;
        let previous = order.status();
        order.cancel()?;

        spend::debit_in(tx.as_mut(), order.customer_id(), order.total_amount()).await?;

        let mut returns: BTreeMap<&str, (ProductId, u32)> = BTreeMap::new();
        for item in order.items() {
            let entry = returns
                .entry(item.product_name.as_str())
                .or_insert((item.product_id, 0));
            entry.1 = entry.1.saturating_add(item.quantity);
        }

        let mut touched = Touched::with_capacity(returns.len());
        for (name, (product_id, quantity)) in returns {
            if tx.product(product_id).await?.is_none() {
                tracing::warn!(
                    %order_id,
                    %product_id,
                    product_name = name,
                    quantity,
                    "product no longer exists, skipping stock return"
                );
                continue;
            }
            inventory::release_in(tx.as_mut(), product_id, quantity).await?;
            inventory::revert_sale_in(tx.as_mut(), product_id, quantity).await?;
            touched.push((product_id, name.to_string()));
        }

        let version = tx.update_order(&order).await?;
        order.set_version(version);
        tx.commit().await?;
        Ok((order, previous, touched))
    }

    /// Moves an order to `status`.
    ///
    /// A move to CANCELLED is a full [`cancel_order`](Self::cancel_order)
    /// with its stock and spend effects.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        if status == OrderStatus::Cancelled {
            return self.cancel_order(order_id).await;
        }

        let start = Instant::now();
        let (order, previous) = retry_on_conflict(&self.config.retry, "update_order_status", || {
            self.try_transition(order_id, status)
        })
        .await
        .inspect_err(|e| tracing::warn!(%order_id, %status, error = %e, "status update failed"))?;

        invalidation::order_changed(&self.cache, &order, Some(previous)).await;

        metrics::counter!("order_status_transitions_total", "to" => status.as_str()).increment(1);
        record_duration("update_order_status", start);
        tracing::info!(
            order_number = %order.order_number(),
            from = %previous,
            to = %status,
            "order status updated"
        );
        Ok(order)
    }

    async fn try_transition(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(Order, OrderStatus)> {
        let mut tx = self.store.begin().await?;
        let mut order = lock_order(tx.as_mut(), order_id).await?;
        let previous = order.transition_to(status)?;
        let version = tx.update_order(&order).await?;
        order.set_version(version);
        tx.commit().await?;
        Ok((order, previous))
    }

    pub async fn process_order(&self, order_id: OrderId) -> Result<Order> {
        self.update_order_status(order_id, OrderStatus::Processing)
            .await
    }

    pub async fn ship_order(&self, order_id: OrderId) -> Result<Order> {
        self.update_order_status(order_id, OrderStatus::Shipped)
            .await
    }

    pub async fn deliver_order(&self, order_id: OrderId) -> Result<Order> {
        self.update_order_status(order_id, OrderStatus::Delivered)
            .await
    }

    /// Adds a line to a PENDING order, reserving its stock and crediting
    /// its price to the customer.
    #[tracing::instrument(skip(self))]
    pub async fn add_order_item(&self, order_id: OrderId, line: OrderLine) -> Result<Order> {
        let start = Instant::now();
        line.validate()?;

        let (order, touched) = retry_on_conflict(&self.config.retry, "add_order_item", || {
            self.try_add_item(order_id, &line)
        })
        .await
        .inspect_err(|e| tracing::warn!(%order_id, error = %e, "adding order item failed"))?;

        invalidation::order_changed(&self.cache, &order, None).await;
        invalidation::products_changed(&self.cache, &touched).await;

        record_duration("add_order_item", start);
        tracing::info!(
            order_number = %order.order_number(),
            product = %line.product_name,
            quantity = line.quantity,
            total = %order.total_amount(),
            "order item added"
        );
        Ok(order)
    }

    async fn try_add_item(&self, order_id: OrderId, line: &OrderLine) -> Result<(Order, Touched)> {
        let mut tx = self.store.begin().await?;
        let mut order = lock_order(tx.as_mut(), order_id).await?;
        if !order.status().can_modify_items() {
            return Err(FulfillmentError::InvalidOrderStatus {
                current: order.status(),
                attempted_action: "add items to",
            });
        }
        lock_customer(tx.as_mut(), order.customer_id()).await?;

        let product = tx
            .product_by_name(&line.product_name)
            .await?
            .ok_or_else(|| FulfillmentError::not_found(Entity::Product, &line.product_name))?;
        if !product.is_available(line.quantity) {
            return Err(FulfillmentError::OutOfStock {
                product_name: product.name,
                requested: line.quantity,
                available: product.stock,
            });
        }

        let item = OrderItem::new(product.id, &line.product_name, line.quantity, line.unit_price);
        let price = item.total_price()?;
        order.add_item(item)?;

        inventory::reserve_in(tx.as_mut(), product.id, line.quantity).await?;
        inventory::record_sale_in(tx.as_mut(), product.id, line.quantity).await?;
        spend::credit_in(tx.as_mut(), order.customer_id(), price).await?;

        let version = tx.update_order(&order).await?;
        order.set_version(version);
        tx.commit().await?;
        Ok((order, vec![(product.id, product.name)]))
    }

    /// Revises the status and/or total of a PENDING order.
    ///
    /// The customer's spend moves by the change in total. Cancellation is
    /// not a revision and is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn revise_order(&self, order_id: OrderId, revision: OrderRevision) -> Result<Order> {
        let start = Instant::now();
        let (order, previous) = retry_on_conflict(&self.config.retry, "revise_order", || {
            self.try_revise(order_id, &revision)
        })
        .await
        .inspect_err(|e| tracing::warn!(%order_id, error = %e, "order revision failed"))?;

        invalidation::order_changed(&self.cache, &order, Some(previous)).await;

        record_duration("revise_order", start);
        tracing::info!(
            order_number = %order.order_number(),
            status = %order.status(),
            total = %order.total_amount(),
            "order revised"
        );
        Ok(order)
    }

    async fn try_revise(
        &self,
        order_id: OrderId,
        revision: &OrderRevision,
    ) -> Result<(Order, OrderStatus)> {
        let mut tx = self.store.begin().await?;
        let mut order = lock_order(tx.as_mut(), order_id).await?;
        let applied = order.revise(revision.status, revision.total_amount)?;

        let delta = applied.total_delta;
        if delta.is_positive() {
            spend::credit_in(tx.as_mut(), order.customer_id(), delta).await?;
        } else if delta.is_negative() {
            spend::debit_in(tx.as_mut(), order.customer_id(), Money::zero() - delta).await?;
        }

        let version = tx.update_order(&order).await?;
        order.set_version(version);
        tx.commit().await?;
        Ok((order, applied.previous_status))
    }

    /// Deletes a DELIVERED or CANCELLED order.
    ///
    /// Stock and spend are left as they are: a delivered order's sale stands
    /// and a cancelled order's effects were already reversed.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, order_id: OrderId) -> Result<Order> {
        let order = retry_on_conflict(&self.config.retry, "delete_order", || {
            self.try_delete(order_id)
        })
        .await?;

        invalidation::order_removed(&self.cache, &order).await;
        tracing::info!(order_number = %order.order_number(), "order deleted");
        Ok(order)
    }

    async fn try_delete(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let order = lock_order(tx.as_mut(), order_id).await?;
        if !order.is_terminal() {
            return Err(FulfillmentError::InvalidOrderStatus {
                current: order.status(),
                attempted_action: "delete",
            });
        }
        tx.delete_order(order_id).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Adds a product to the catalog.
    #[tracing::instrument(skip(self))]
    pub async fn register_product(&self, name: &str, price: Money, stock: u32) -> Result<Product> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FulfillmentError::invalid_argument(
                "product name must not be blank",
            ));
        }
        if !price.is_positive() {
            return Err(FulfillmentError::invalid_argument(format!(
                "price must be positive, got {price}"
            )));
        }

        let mut product = Product::new(name, price, stock);
        let version = self.store.save_product(&product).await?;
        product.set_version(version);

        invalidation::product_changed(&self.cache, &product).await;
        tracing::info!(product_id = %product.id, %price, stock, "product registered");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn register_customer(&self, name: &str, email: &str) -> Result<Customer> {
        if name.trim().is_empty() {
            return Err(FulfillmentError::invalid_argument(
                "customer name must not be blank",
            ));
        }
        if !email.contains('@') {
            return Err(FulfillmentError::invalid_argument(format!(
                "invalid email address: {email}"
            )));
        }

        let mut customer = Customer::new(name.trim(), email.trim());
        let version = self.store.save_customer(&customer).await?;
        customer.set_version(version);

        tracing::info!(customer_id = %customer.id, "customer registered");
        Ok(customer)
    }
}

async fn lock_order(tx: &mut dyn Transaction, order_id: OrderId) -> Result<Order> {
    tx.order(order_id)
        .await?
        .ok_or_else(|| FulfillmentError::not_found(Entity::Order, order_id))
}

async fn lock_customer(tx: &mut dyn Transaction, customer_id: CustomerId) -> Result<Customer> {
    tx.customer(customer_id)
        .await?
        .ok_or_else(|| FulfillmentError::not_found(Entity::Customer, customer_id))
}

fn record_duration(operation: &'static str, start: Instant) {
    metrics::histogram!("order_operation_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}
