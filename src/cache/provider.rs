use std::sync::Arc;

use tracing::{info, warn};

use super::config::{CacheBackendKind, CacheConfig};
use super::redis_store::RedisCacheStore;
use super::store::{CacheStore, MemoryCacheStore, NoopCacheStore};

/// Builds the configured cache store.
///
/// An unreachable Redis never blocks startup: the service falls back to the
/// in-process store and logs the degradation.
pub async fn build_cache_store(config: &CacheConfig) -> Arc<dyn CacheStore> {
    if !config.enabled {
        info!(target = "catalog::cache", "read-through cache disabled");
        return Arc::new(NoopCacheStore);
    }

    info!(
        target = "catalog::cache",
        backend = config.backend.as_str(),
        ttl_secs = config.ttl.as_secs(),
        single_flight = config.single_flight,
        "building cache store"
    );
    match config.backend {
        CacheBackendKind::Memory => {
            info!(
                target = "catalog::cache",
                capacity = config.memory_capacity,
                "using in-process cache store"
            );
            Arc::new(MemoryCacheStore::new(config))
        }
        CacheBackendKind::Redis => match RedisCacheStore::connect(&config.redis_url).await {
            Ok(store) => {
                info!(target = "catalog::cache", "connected to redis cache");
                Arc::new(store)
            }
            Err(err) => {
                warn!(
                    target = "catalog::cache",
                    error = %err,
                    "redis unavailable, falling back to in-process cache store"
                );
                Arc::new(MemoryCacheStore::new(config))
            }
        },
    }
}
