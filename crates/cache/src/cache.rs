//! Cache port.

use std::time::Duration;

use async_trait::async_trait;
use domain::{Order, Product};

use crate::{CacheKey, Region};

/// A cached lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Order(Order),
    Orders(Vec<Order>),
    Product(Product),
    Products(Vec<Product>),
}

impl CachedValue {
    pub fn into_order(self) -> Option<Order> {
        match self {
            CachedValue::Order(order) => Some(order),
            _ => None,
        }
    }

    pub fn into_orders(self) -> Option<Vec<Order>> {
        match self {
            CachedValue::Orders(orders) => Some(orders),
            _ => None,
        }
    }

    pub fn into_product(self) -> Option<Product> {
        match self {
            CachedValue::Product(product) => Some(product),
            _ => None,
        }
    }

    pub fn into_products(self) -> Option<Vec<Product>> {
        match self {
            CachedValue::Products(products) => Some(products),
            _ => None,
        }
    }
}

/// A key-value cache partitioned into [`Region`]s.
///
/// Cache operations never fail: a broken or missing cache only costs a
/// store round trip.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    async fn get(&self, key: &CacheKey) -> Option<CachedValue>;

    /// Stores `value`. `ttl` of `None` uses the region's default.
    ///
    /// A cached order is never replaced by a lower version of itself.
    async fn put(&self, key: CacheKey, value: CachedValue, ttl: Option<Duration>);

    /// Returns a stamp that changes whenever `region` is written by
    /// [`Cache::put`] or loses entries to eviction.
    async fn generation(&self, region: Region) -> u64;

    /// Stores a value loaded from the store, unless the key's region changed
    /// since `generation` was read. Returns whether the value was stored.
    ///
    /// `generation` must be read before the load starts.
    async fn fill(&self, key: CacheKey, value: CachedValue, generation: u64) -> bool;

    async fn evict(&self, key: &CacheKey);

    /// Evicts every entry in `region` whose name starts with `prefix`.
    async fn evict_prefix(&self, region: Region, prefix: &str);

    /// Evicts every entry in `region`.
    async fn clear(&self, region: Region);
}
