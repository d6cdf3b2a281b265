use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use domain::Aggregate;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{Cache, CacheKey, CachedValue, Region};

/// Capacity and time-to-live of one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionPolicy {
    pub max_entries: usize,
    pub ttl: Duration,
}

impl RegionPolicy {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self { max_entries, ttl }
    }
}

/// Per-region cache policies.
///
/// Order regions default to 800 entries for 15 minutes, product regions to
/// 1000 entries for 30 minutes.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub order: RegionPolicy,
    pub orders: RegionPolicy,
    pub user_orders: RegionPolicy,
    pub product: RegionPolicy,
    pub products: RegionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let orders = RegionPolicy::new(800, Duration::from_secs(15 * 60));
        let products = RegionPolicy::new(1000, Duration::from_secs(30 * 60));
        Self {
            order: orders,
            orders,
            user_orders: orders,
            product: products,
            products,
        }
    }
}

impl CacheConfig {
    /// Sets the time-to-live of the three order regions.
    pub fn with_order_ttl(mut self, ttl: Duration) -> Self {
        self.order.ttl = ttl;
        self.orders.ttl = ttl;
        self.user_orders.ttl = ttl;
        self
    }

    /// Sets the time-to-live of the two product regions.
    pub fn with_product_ttl(mut self, ttl: Duration) -> Self {
        self.product.ttl = ttl;
        self.products.ttl = ttl;
        self
    }

    /// Sets the same capacity on every region.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        for region in Region::ALL {
            self.policy_mut(region).max_entries = max_entries;
        }
        self
    }

    pub fn policy(&self, region: Region) -> RegionPolicy {
        match region {
            Region::Order => self.order,
            Region::Orders => self.orders,
            Region::UserOrders => self.user_orders,
            Region::Product => self.product,
            Region::Products => self.products,
        }
    }

    fn policy_mut(&mut self, region: Region) -> &mut RegionPolicy {
        match region {
            Region::Order => &mut self.order,
            Region::Orders => &mut self.orders,
            Region::UserOrders => &mut self.user_orders,
            Region::Product => &mut self.product,
            Region::Products => &mut self.products,
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped because a region was full.
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

struct Entry {
    value: CachedValue,
    expires_at: Instant,
}

impl Entry {
    /// True if this entry is a live copy of the same order at a higher
    /// version than `value`.
    fn supersedes(&self, value: &CachedValue, now: Instant) -> bool {
        match (&self.value, value) {
            (CachedValue::Order(held), CachedValue::Order(incoming)) => {
                self.expires_at > now && held.version() > incoming.version()
            }
            _ => false,
        }
    }
}

#[derive(Default)]
struct RegionState {
    entries: HashMap<String, Entry>,
    /// Bumped on every put and eviction.
    generation: u64,
}

/// In-memory cache with per-region capacity and expiry.
///
/// Expired entries are treated as absent and dropped lazily. When a region
/// is full, the entry closest to expiry makes room for the new one.
#[derive(Clone)]
pub struct InMemoryCache {
    regions: Arc<RwLock<HashMap<Region, RegionState>>>,
    config: Arc<CacheConfig>,
    counters: Arc<Counters>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl InMemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            regions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Returns the number of live entries in `region`.
    pub async fn len(&self, region: Region) -> usize {
        let now = Instant::now();
        self.regions
            .read()
            .await
            .get(&region)
            .map_or(0, |state| {
                state.entries.values().filter(|e| e.expires_at > now).count()
            })
    }

    pub async fn is_empty(&self, region: Region) -> bool {
        self.len(region).await == 0
    }

    fn record_hit(&self, region: Region) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_hits_total", "region" => region.as_str()).increment(1);
    }

    fn record_miss(&self, region: Region) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_misses_total", "region" => region.as_str()).increment(1);
    }

    fn record_eviction(&self, region: Region) {
        self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_evictions_total", "region" => region.as_str()).increment(1);
    }

    /// Inserts into `state`, making room if the region is full.
    ///
    /// Returns false if a newer copy of the same order is already held.
    fn insert(
        &self,
        region: Region,
        state: &mut RegionState,
        name: String,
        value: CachedValue,
        ttl: Duration,
    ) -> bool {
        let policy = self.config.policy(region);
        let now = Instant::now();
        let entries = &mut state.entries;

        if entries.get(&name).is_some_and(|e| e.supersedes(&value, now)) {
            tracing::debug!(%region, key = %name, "kept newer cached order");
            return false;
        }

        if !entries.contains_key(&name) && entries.len() >= policy.max_entries {
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() >= policy.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(name, _)| name.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    self.record_eviction(region);
                    tracing::debug!(%region, evicted = %oldest, "cache region full");
                }
            }
        }

        entries.insert(
            name,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        true
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let region = key.region();
        let name = key.name();
        let now = Instant::now();

        {
            let regions = self.regions.read().await;
            match regions.get(&region).and_then(|state| state.entries.get(&name)) {
                Some(entry) if entry.expires_at > now => {
                    self.record_hit(region);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.record_miss(region);
                    return None;
                }
            }
        }

        // Expired: drop it unless it was refreshed in the meantime.
        let mut regions = self.regions.write().await;
        if let Some(state) = regions.get_mut(&region)
            && state.entries.get(&name).is_some_and(|e| e.expires_at <= now)
        {
            state.entries.remove(&name);
        }
        self.record_miss(region);
        None
    }

    async fn put(&self, key: CacheKey, value: CachedValue, ttl: Option<Duration>) {
        let region = key.region();
        let policy = self.config.policy(region);
        let mut regions = self.regions.write().await;
        let state = regions.entry(region).or_default();
        state.generation += 1;
        if policy.max_entries == 0 {
            return;
        }
        self.insert(
            region,
            state,
            key.name(),
            value,
            ttl.unwrap_or(policy.ttl),
        );
    }

    async fn generation(&self, region: Region) -> u64 {
        self.regions
            .read()
            .await
            .get(&region)
            .map_or(0, |state| state.generation)
    }

    async fn fill(&self, key: CacheKey, value: CachedValue, generation: u64) -> bool {
        let region = key.region();
        let policy = self.config.policy(region);
        if policy.max_entries == 0 {
            return false;
        }

        let mut regions = self.regions.write().await;
        let state = regions.entry(region).or_default();
        if state.generation != generation {
            tracing::debug!(%region, key = %key.name(), "skipped fill after concurrent change");
            return false;
        }
        self.insert(region, state, key.name(), value, policy.ttl)
    }

    async fn evict(&self, key: &CacheKey) {
        let mut regions = self.regions.write().await;
        let state = regions.entry(key.region()).or_default();
        state.generation += 1;
        state.entries.remove(&key.name());
    }

    async fn evict_prefix(&self, region: Region, prefix: &str) {
        let mut regions = self.regions.write().await;
        let state = regions.entry(region).or_default();
        state.generation += 1;
        state.entries.retain(|name, _| !name.starts_with(prefix));
    }

    async fn clear(&self, region: Region) {
        let mut regions = self.regions.write().await;
        let state = regions.entry(region).or_default();
        state.generation += 1;
        state.entries.clear();
    }
}
