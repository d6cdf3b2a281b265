//! Application configuration loaded from environment variables.

use std::time::Duration;

use cache::CacheConfig;
use fulfillment::FulfillmentConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `DATABASE_URL`: Postgres connection string; unset runs in memory
/// - `ORDER_CACHE_TTL_SECS`: lifetime of cached orders (default `900`)
/// - `PRODUCT_CACHE_TTL_SECS`: lifetime of cached products (default `1800`)
/// - `CACHE_MAX_ENTRIES`: per-region capacity; unset keeps region defaults
/// - `CONFLICT_RETRIES`: retries after a concurrent update (default `3`)
/// - `SEED_DEMO_DATA`: load a demo catalog at startup (default `false`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub order_cache_ttl: Duration,
    pub product_cache_ttl: Duration,
    pub cache_max_entries: Option<usize>,
    pub conflict_retries: u32,
    pub seed_demo_data: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            order_cache_ttl: parsed("ORDER_CACHE_TTL_SECS")
                .map_or(defaults.order_cache_ttl, Duration::from_secs),
            product_cache_ttl: parsed("PRODUCT_CACHE_TTL_SECS")
                .map_or(defaults.product_cache_ttl, Duration::from_secs),
            cache_max_entries: lookup("CACHE_MAX_ENTRIES").and_then(|v| v.trim().parse().ok()),
            conflict_retries: lookup("CONFLICT_RETRIES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.conflict_retries),
            seed_demo_data: lookup("SEED_DEMO_DATA")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.seed_demo_data),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cache_config(&self) -> CacheConfig {
        let config = CacheConfig::default()
            .with_order_ttl(self.order_cache_ttl)
            .with_product_ttl(self.product_cache_ttl);
        match self.cache_max_entries {
            Some(max_entries) => config.with_max_entries(max_entries),
            None => config,
        }
    }

    pub fn fulfillment_config(&self) -> FulfillmentConfig {
        FulfillmentConfig::default().with_max_conflict_retries(self.conflict_retries)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            order_cache_ttl: Duration::from_secs(900),
            product_cache_ttl: Duration::from_secs(1800),
            cache_max_entries: None,
            conflict_retries: 3,
            seed_demo_data: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use cache::Region;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_pairs(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.order_cache_ttl, Duration::from_secs(900));
        assert_eq!(config.product_cache_ttl, Duration::from_secs(1800));
        assert_eq!(config.conflict_retries, 3);
        assert!(!config.seed_demo_data);
    }

    #[test]
    fn test_reads_every_variable() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("RUST_LOG", "debug"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("ORDER_CACHE_TTL_SECS", "60"),
            ("PRODUCT_CACHE_TTL_SECS", "120"),
            ("CACHE_MAX_ENTRIES", "50"),
            ("CONFLICT_RETRIES", "0"),
            ("SEED_DEMO_DATA", "true"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/shop")
        );
        assert_eq!(config.conflict_retries, 0);
        assert!(config.seed_demo_data);

        let cache = config.cache_config();
        assert_eq!(cache.policy(Region::Order).ttl, Duration::from_secs(60));
        assert_eq!(cache.policy(Region::Products).ttl, Duration::from_secs(120));
        assert_eq!(cache.policy(Region::UserOrders).max_entries, 50);
        assert_eq!(config.fulfillment_config().retry.max_retries, 0);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("ORDER_CACHE_TTL_SECS", "-5"),
            ("DATABASE_URL", "  "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.order_cache_ttl, Duration::from_secs(900));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }
}
