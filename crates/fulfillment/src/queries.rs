//! Read operations, served from the cache when possible.

use std::future::Future;

use cache::{Cache, CacheKey, CachedValue};
use common::{CustomerId, Money, OrderId, ProductId};
use domain::{Customer, Order, OrderStatus, Product};
use store::Store;

use crate::{Entity, FulfillmentError, FulfillmentService, Result};

impl<S, C> FulfillmentService<S, C>
where
    S: Store + Clone,
    C: Cache + Clone,
{
    /// Looks `key` up in the cache, falling back to `load` and caching its
    /// result. Errors are never cached, and neither is a result loaded while
    /// a commit changed the key's region.
    async fn read_through<T, F, Fut>(
        &self,
        key: CacheKey,
        unwrap: fn(CachedValue) -> Option<T>,
        wrap: fn(T) -> CachedValue,
        load: F,
    ) -> Result<T>
    where
        T: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.cache.get(&key).await.and_then(unwrap) {
            return Ok(value);
        }
        let generation = self.cache.generation(key.region()).await;
        let value = load().await?;
        self.cache.fill(key, wrap(value.clone()), generation).await;
        Ok(value)
    }

    async fn cached_orders<F, Fut>(&self, key: CacheKey, load: F) -> Result<Vec<Order>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Order>>>,
    {
        self.read_through(key, CachedValue::into_orders, CachedValue::Orders, load)
            .await
    }

    async fn cached_products<F, Fut>(&self, key: CacheKey, load: F) -> Result<Vec<Product>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Product>>>,
    {
        self.read_through(key, CachedValue::into_products, CachedValue::Products, load)
            .await
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.read_through(
            CacheKey::Order(order_id),
            CachedValue::into_order,
            CachedValue::Order,
            move || async move {
                self.store
                    .get_order(order_id)
                    .await?
                    .ok_or_else(|| FulfillmentError::not_found(Entity::Order, order_id))
            },
        )
        .await
    }

    pub async fn get_order_by_number(&self, order_number: &str) -> Result<Order> {
        self.read_through(
            CacheKey::OrderNumber(order_number.to_string()),
            CachedValue::into_order,
            CachedValue::Order,
            move || async move {
                self.store
                    .find_order_by_number(order_number)
                    .await?
                    .ok_or_else(|| FulfillmentError::not_found(Entity::Order, order_number))
            },
        )
        .await
    }

    /// Returns the customer's orders, newest first.
    pub async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        self.cached_orders(CacheKey::CustomerOrders(customer_id), move || async move {
            Ok(self.store.find_orders_by_customer(customer_id).await?)
        })
        .await
    }

    pub async fn orders_for_customer_with_status(
        &self,
        customer_id: CustomerId,
        status: OrderStatus,
    ) -> Result<Vec<Order>> {
        self.cached_orders(
            CacheKey::CustomerOrdersByStatus(customer_id, status),
            move || async move {
                let orders = self.store.find_orders_by_customer(customer_id).await?;
                Ok(orders
                    .into_iter()
                    .filter(|order| order.status() == status)
                    .collect())
            },
        )
        .await
    }

    pub async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        self.cached_orders(CacheKey::OrdersByStatus(status), move || async move {
            Ok(self.store.find_orders_by_status(status).await?)
        })
        .await
    }

    /// Returns orders whose total is strictly greater than `amount`.
    pub async fn orders_above_amount(&self, amount: Money) -> Result<Vec<Order>> {
        self.cached_orders(CacheKey::OrdersAbove(amount), move || async move {
            Ok(self.store.find_orders_above_amount(amount).await?)
        })
        .await
    }

    /// Every order, newest first. Not cached.
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_orders().await?)
    }

    /// Whether the order exists and may move to PROCESSING.
    pub async fn can_process_order(&self, order_id: OrderId) -> Result<bool> {
        self.check_order(order_id, |order| order.status().can_process())
            .await
    }

    /// Whether the order exists and may be cancelled.
    pub async fn can_cancel_order(&self, order_id: OrderId) -> Result<bool> {
        self.check_order(order_id, |order| order.status().can_cancel())
            .await
    }

    async fn check_order(&self, order_id: OrderId, check: fn(&Order) -> bool) -> Result<bool> {
        match self.get_order(order_id).await {
            Ok(order) => Ok(check(&order)),
            Err(FulfillmentError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Sum of the order's line prices, which can differ from its stored
    /// total after a revision.
    pub async fn order_line_total(&self, order_id: OrderId) -> Result<Money> {
        Ok(self.get_order(order_id).await?.line_total()?)
    }

    pub async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        self.read_through(
            CacheKey::Product(product_id),
            CachedValue::into_product,
            CachedValue::Product,
            move || async move {
                self.store
                    .get_product(product_id)
                    .await?
                    .ok_or_else(|| FulfillmentError::not_found(Entity::Product, product_id))
            },
        )
        .await
    }

    pub async fn product_by_name(&self, name: &str) -> Result<Product> {
        self.read_through(
            CacheKey::ProductByName(name.to_string()),
            CachedValue::into_product,
            CachedValue::Product,
            move || async move {
                self.store
                    .find_product_by_name(name)
                    .await?
                    .ok_or_else(|| FulfillmentError::not_found(Entity::Product, name))
            },
        )
        .await
    }

    /// Every product, ordered by name. Not cached.
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.store.list_products().await?)
    }

    pub async fn products_in_stock(&self) -> Result<Vec<Product>> {
        self.cached_products(CacheKey::InStock, move || async move {
            let products = self.store.list_products().await?;
            Ok(products.into_iter().filter(Product::is_in_stock).collect())
        })
        .await
    }

    pub async fn products_out_of_stock(&self) -> Result<Vec<Product>> {
        self.cached_products(CacheKey::OutOfStock, move || async move {
            let products = self.store.list_products().await?;
            Ok(products
                .into_iter()
                .filter(|product| !product.is_in_stock())
                .collect())
        })
        .await
    }

    /// Products that are in stock but below `threshold` units.
    pub async fn low_stock_products(&self, threshold: u32) -> Result<Vec<Product>> {
        self.cached_products(CacheKey::LowStock(threshold), move || async move {
            let products = self.store.list_products().await?;
            Ok(products
                .into_iter()
                .filter(|product| product.is_low_stock(threshold))
                .collect())
        })
        .await
    }

    /// The `limit` best sellers, highest sales count first. Ties keep name
    /// order.
    pub async fn top_selling_products(&self, limit: usize) -> Result<Vec<Product>> {
        self.cached_products(CacheKey::TopSelling(limit), move || async move {
            let mut products = self.store.list_products().await?;
            products.sort_by(|a, b| b.sales_count.cmp(&a.sales_count));
            products.truncate(limit);
            Ok(products)
        })
        .await
    }

    /// Customers are not cached; their spend changes with every order.
    pub async fn get_customer(&self, customer_id: CustomerId) -> Result<Customer> {
        self.store
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found(Entity::Customer, customer_id))
    }
}
