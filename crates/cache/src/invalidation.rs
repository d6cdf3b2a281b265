//! Cache maintenance after committed changes.
//!
//! Single-entity entries are refreshed in place; every list that could
//! contain the changed entity is evicted so the next read goes to the store.

use common::ProductId;
use domain::{Aggregate, Order, OrderStatus, Product};

use crate::{Cache, CacheKey, CachedValue, Region};

/// Refreshes caches after `order` was created or changed.
///
/// `previous_status` is the status before the change, if it differs; lists
/// keyed by that status are evicted as well.
pub async fn order_changed<C>(cache: &C, order: &Order, previous_status: Option<OrderStatus>)
where
    C: Cache + ?Sized,
{
    cache
        .put(
            CacheKey::Order(order.id()),
            CachedValue::Order(order.clone()),
            None,
        )
        .await;
    cache
        .put(
            CacheKey::OrderNumber(order.order_number().to_string()),
            CachedValue::Order(order.clone()),
            None,
        )
        .await;
    evict_order_lists(cache, order, previous_status).await;
}

/// Drops every cache entry that could contain the deleted `order`.
pub async fn order_removed<C>(cache: &C, order: &Order)
where
    C: Cache + ?Sized,
{
    cache.evict(&CacheKey::Order(order.id())).await;
    cache
        .evict(&CacheKey::OrderNumber(order.order_number().to_string()))
        .await;
    evict_order_lists(cache, order, None).await;
}

async fn evict_order_lists<C>(cache: &C, order: &Order, previous_status: Option<OrderStatus>)
where
    C: Cache + ?Sized,
{
    let customer = order.customer_id();
    let statuses = std::iter::once(order.status()).chain(previous_status);

    cache.evict(&CacheKey::CustomerOrders(customer)).await;
    for status in statuses {
        cache
            .evict(&CacheKey::CustomerOrdersByStatus(customer, status))
            .await;
        cache.evict(&CacheKey::OrdersByStatus(status)).await;
    }
    cache
        .evict_prefix(Region::Orders, CacheKey::ORDERS_ABOVE_PREFIX)
        .await;
}

/// Drops cache entries for products whose stock or sales changed.
///
/// Product lists are evicted once regardless of how many products changed.
pub async fn products_changed<C>(cache: &C, products: &[(ProductId, String)])
where
    C: Cache + ?Sized,
{
    if products.is_empty() {
        return;
    }
    for (id, name) in products {
        cache.evict(&CacheKey::Product(*id)).await;
        cache.evict(&CacheKey::ProductByName(name.clone())).await;
    }
    cache.evict(&CacheKey::InStock).await;
    cache.evict(&CacheKey::OutOfStock).await;
    cache
        .evict_prefix(Region::Products, CacheKey::LOW_STOCK_PREFIX)
        .await;
    cache
        .evict_prefix(Region::Products, CacheKey::TOP_SELLING_PREFIX)
        .await;
}

/// Convenience for a single product.
pub async fn product_changed<C>(cache: &C, product: &Product)
where
    C: Cache + ?Sized,
{
    products_changed(cache, &[(product.id, product.name.clone())]).await;
}
