//! Cache configuration.
//!
//! Controls the product read-through cache via the `[cache]` section.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

pub(crate) const DEFAULT_TTL_SECONDS: u64 = 60;
pub(crate) const DEFAULT_MEMORY_CAPACITY: usize = 1024;
pub(crate) const DEFAULT_KEY_PREFIX: &str = "catalog";
pub(crate) const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";

/// Which store backs the read-through cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Redis,
    Memory,
}

impl CacheBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheBackendKind::Redis => "redis",
            CacheBackendKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every lookup is a miss and nothing is written.
    pub enabled: bool,
    pub backend: CacheBackendKind,
    pub redis_url: String,
    /// Expiry applied to every entry written on a miss.
    pub ttl: Duration,
    /// Collapse concurrent misses on one key into a single fetch.
    pub single_flight: bool,
    /// Entry limit for the in-process backend.
    pub memory_capacity: usize,
    /// Namespace prepended to every key.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::Redis,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            single_flight: true,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            redis_url: settings.redis_url.clone(),
            ttl: Duration::from_secs(u64::from(settings.ttl_seconds.get())),
            single_flight: settings.single_flight,
            memory_capacity: settings.memory_capacity,
            key_prefix: settings.key_prefix.clone(),
        }
    }
}

impl CacheConfig {
    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_redis_with_one_minute_ttl() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.backend, CacheBackendKind::Redis);
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert!(config.single_flight);
    }

    #[test]
    fn backend_names_match_config_values() {
        for kind in [CacheBackendKind::Redis, CacheBackendKind::Memory] {
            let parsed: CacheBackendKind =
                serde_json::from_value(serde_json::Value::from(kind.as_str()))
                    .expect("backend name deserializes");
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let config = CacheConfig {
            memory_capacity: 0,
            ..CacheConfig::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
    }
}
