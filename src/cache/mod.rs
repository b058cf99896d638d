//! Product read-through cache.
//!
//! - [`CacheStore`] abstracts the byte store (Redis, in-process LRU, or a
//!   disabled no-op store).
//! - [`ReadThroughCache`] serves lookups, populates misses and collapses
//!   concurrent misses on one key.
//! - [`CacheKeys`] derives deterministic keys from product ids and listing
//!   queries.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379/0"
//! ttl_seconds = 60
//! single_flight = true
//! ```
//!
//! Entries are never invalidated on write; a changed product becomes visible
//! once the entries that include it expire.

mod config;
mod keys;
mod lock;
mod provider;
mod read_through;
mod redis_store;
mod store;

pub use config::{CacheBackendKind, CacheConfig};
pub(crate) use config::{
    DEFAULT_KEY_PREFIX, DEFAULT_MEMORY_CAPACITY, DEFAULT_REDIS_URL, DEFAULT_TTL_SECONDS,
};
pub use keys::{CacheKeys, PRODUCT_KEY_PREFIX, PRODUCT_LIST_KEY_PREFIX};
pub use provider::build_cache_store;
pub use read_through::{
    METRIC_CACHE_BACKEND_ERROR_TOTAL, METRIC_CACHE_COALESCED_TOTAL,
    METRIC_CACHE_DECODE_ERROR_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL,
    METRIC_CACHE_POPULATE_MS, ReadThroughCache,
};
pub use redis_store::RedisCacheStore;
pub use store::{CacheError, CacheStore, MemoryCacheStore, NoopCacheStore};
