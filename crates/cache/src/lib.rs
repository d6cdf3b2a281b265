//! Read-through cache for order and product lookups.
//!
//! This crate provides:
//! - [`Cache`] trait, the port the fulfillment service reads through
//! - [`CacheKey`] and [`Region`], the key space grouped into five regions
//! - [`InMemoryCache`] with per-region capacity and time-to-live
//! - [`invalidation`] helpers applied after every committed change

pub mod cache;
pub mod invalidation;
pub mod key;
pub mod memory;

pub use cache::{Cache, CachedValue};
pub use key::{CacheKey, Region};
pub use memory::{CacheConfig, CacheStats, InMemoryCache, RegionPolicy};
