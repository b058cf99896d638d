//! Read-through coordination in front of a [`CacheStore`].
//!
//! A lookup that hits returns the decoded value and never calls the producer.
//! A miss calls the producer once, stores its serialized result with the
//! configured expiry and returns it. Undecodable entries and backend errors
//! are misses; producer errors are returned unchanged and leave the cache
//! untouched.
//!
//! With single-flight enabled, concurrent misses on the same key inside this
//! process wait for the first caller (the leader) instead of each hitting the
//! store. If the leader fails or is cancelled, waiters run their own producer.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::store::CacheStore;

pub const METRIC_CACHE_HIT_TOTAL: &str = "catalog_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "catalog_cache_miss_total";
pub const METRIC_CACHE_DECODE_ERROR_TOTAL: &str = "catalog_cache_decode_error_total";
pub const METRIC_CACHE_BACKEND_ERROR_TOTAL: &str = "catalog_cache_backend_error_total";
pub const METRIC_CACHE_COALESCED_TOTAL: &str = "catalog_cache_coalesced_total";
pub const METRIC_CACHE_POPULATE_MS: &str = "catalog_cache_populate_ms";

const TARGET: &str = "catalog::cache::read_through";

#[derive(Clone)]
enum Flight {
    Pending,
    Ready(Arc<[u8]>),
    Abandoned,
}

type InFlight = DashMap<String, watch::Receiver<Flight>>;

enum Role {
    Leader(FlightGuard),
    Follower(watch::Receiver<Flight>),
}

/// Owned by the leader of a flight. Dropping it without calling
/// [`FlightGuard::complete`] releases followers with `Abandoned`.
struct FlightGuard {
    key: String,
    sender: watch::Sender<Flight>,
    in_flight: Arc<InFlight>,
}

impl FlightGuard {
    fn complete(self, bytes: Arc<[u8]>) {
        self.sender.send_replace(Flight::Ready(bytes));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.sender.send_if_modified(|flight| {
            if matches!(flight, Flight::Pending) {
                *flight = Flight::Abandoned;
                true
            } else {
                false
            }
        });
        self.in_flight.remove(&self.key);
    }
}

#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn CacheStore>,
    single_flight: bool,
    in_flight: Arc<InFlight>,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn CacheStore>, single_flight: bool) -> Self {
        Self {
            store,
            single_flight,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    pub async fn get_or_populate<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.lookup(key).await {
            return Ok(value);
        }

        if !self.single_flight {
            return self.populate(key, ttl, producer).await.map(|(value, _)| value);
        }

        match self.join_or_lead(key) {
            Role::Follower(receiver) => {
                counter!(METRIC_CACHE_COALESCED_TOTAL).increment(1);
                if let Some(bytes) = wait_for_leader(receiver).await {
                    match serde_json::from_slice(&bytes) {
                        Ok(value) => return Ok(value),
                        Err(err) => warn!(
                            target = TARGET,
                            key,
                            error = %err,
                            "leader result could not be decoded"
                        ),
                    }
                }
                debug!(target = TARGET, key, "leader gave up, fetching independently");
                self.populate(key, ttl, producer).await.map(|(value, _)| value)
            }
            Role::Leader(guard) => {
                let (value, bytes) = self.populate(key, ttl, producer).await?;
                if let Some(bytes) = bytes {
                    guard.complete(bytes);
                }
                Ok(value)
            }
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
                    debug!(target = TARGET, key, "cache hit");
                    Some(value)
                }
                Err(err) => {
                    counter!(METRIC_CACHE_DECODE_ERROR_TOTAL).increment(1);
                    warn!(
                        target = TARGET,
                        key,
                        error = %err,
                        "discarding undecodable cache entry"
                    );
                    None
                }
            },
            Ok(None) => {
                counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
                debug!(target = TARGET, key, "cache miss");
                None
            }
            Err(err) => {
                counter!(METRIC_CACHE_BACKEND_ERROR_TOTAL).increment(1);
                warn!(
                    target = TARGET,
                    key,
                    backend = self.store.name(),
                    error = %err,
                    "cache lookup failed, treating as miss"
                );
                None
            }
        }
    }

    /// Runs the producer and writes its encoded result. Returns the encoded
    /// bytes when they were produced so a leader can hand them to followers.
    async fn populate<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<(T, Option<Arc<[u8]>>), E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let value = producer().await?;
        histogram!(METRIC_CACHE_POPULATE_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let bytes = match serde_json::to_vec(&value) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    target = TARGET,
                    key,
                    error = %err,
                    "value could not be encoded, skipping cache write"
                );
                return Ok((value, None));
            }
        };
        let shared: Arc<[u8]> = Arc::from(bytes.as_slice());

        if let Err(err) = self.store.set(key, bytes, ttl).await {
            counter!(METRIC_CACHE_BACKEND_ERROR_TOTAL).increment(1);
            warn!(
                target = TARGET,
                key,
                backend = self.store.name(),
                error = %err,
                "cache write failed"
            );
        }

        Ok((value, Some(shared)))
    }

    fn join_or_lead(&self, key: &str) -> Role {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(occupied) => Role::Follower(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let (sender, receiver) = watch::channel(Flight::Pending);
                vacant.insert(receiver);
                Role::Leader(FlightGuard {
                    key: key.to_string(),
                    sender,
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
        }
    }
}

async fn wait_for_leader(mut receiver: watch::Receiver<Flight>) -> Option<Arc<[u8]>> {
    let flight = receiver
        .wait_for(|flight| !matches!(flight, Flight::Pending))
        .await
        .ok()?;
    match &*flight {
        Flight::Ready(bytes) => Some(Arc::clone(bytes)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde::Deserialize;

    use crate::cache::config::CacheConfig;
    use crate::cache::store::{CacheError, MemoryCacheStore};

    const TTL: Duration = Duration::from_secs(60);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: i64,
        name: String,
    }

    fn item(id: i64) -> Item {
        Item {
            id,
            name: format!("item-{id}"),
        }
    }

    /// Memory store that counts writes.
    struct CountingStore {
        inner: MemoryCacheStore,
        writes: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryCacheStore::new(&CacheConfig::default()),
                writes: AtomicUsize::new(0),
            })
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CacheStore for CountingStore {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value, ttl).await
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    /// Store whose every call fails.
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::command("READONLY"))
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }
    }

    #[tokio::test]
    async fn miss_calls_producer_once_and_writes_once() {
        let store = CountingStore::new();
        let cache = ReadThroughCache::new(store.clone(), true);
        let calls = AtomicUsize::new(0);

        let first: Result<Item, ()> = cache
            .get_or_populate("product:1", TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(item(1))
            })
            .await;
        let second: Result<Item, ()> = cache
            .get_or_populate("product:1", TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(item(2))
            })
            .await;

        assert_eq!(first, Ok(item(1)));
        assert_eq!(second, Ok(item(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_a_fresh_fetch() {
        let store = CountingStore::new();
        let cache = ReadThroughCache::new(store.clone(), true);

        let _: Result<Item, ()> = cache
            .get_or_populate("product:1", TTL, || async { Ok(item(1)) })
            .await;
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        let refreshed: Result<Item, ()> = cache
            .get_or_populate("product:1", TTL, || async { Ok(item(7)) })
            .await;

        assert_eq!(refreshed, Ok(item(7)));
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn producer_error_is_returned_and_nothing_is_cached() {
        let store = CountingStore::new();
        let cache = ReadThroughCache::new(store.clone(), true);

        let failed: Result<Item, &str> = cache
            .get_or_populate("product:9", TTL, || async { Err("store down") })
            .await;

        assert_eq!(failed, Err("store down"));
        assert_eq!(store.writes(), 0);
        assert_eq!(store.get("product:9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupted_entry_is_treated_as_miss_and_overwritten() {
        let store = CountingStore::new();
        store
            .inner
            .set("product:3", b"not json".to_vec(), TTL)
            .await
            .unwrap();
        let cache = ReadThroughCache::new(store.clone(), false);

        let value: Result<Item, ()> = cache
            .get_or_populate("product:3", TTL, || async { Ok(item(3)) })
            .await;

        assert_eq!(value, Ok(item(3)));
        let stored = store.get("product:3").await.unwrap().expect("rewritten");
        assert_eq!(serde_json::from_slice::<Item>(&stored).unwrap(), item(3));
    }

    #[tokio::test]
    async fn backend_failures_degrade_to_direct_fetches() {
        let cache = ReadThroughCache::new(Arc::new(BrokenStore), true);

        let value: Result<Item, ()> = cache
            .get_or_populate("product:4", TTL, || async { Ok(item(4)) })
            .await;

        assert_eq!(value, Ok(item(4)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_collapse_into_one_fetch() {
        let store = CountingStore::new();
        let cache = ReadThroughCache::new(store.clone(), true);
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, released) = watch::channel(false);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            let mut released = released.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_populate("products:0:10:id:asc::::", TTL, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = released.wait_for(|open| *open).await;
                        Ok::<_, ()>(vec![item(1), item(2)])
                    })
                    .await
            }));
        }

        // Let every task reach the lookup before the leader is released.
        while cache.in_flight.is_empty() || calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.send_replace(true);

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(vec![item(1), item(2)]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes(), 1);
        assert!(cache.in_flight.is_empty());
    }

    #[tokio::test]
    async fn followers_fetch_on_their_own_when_the_leader_fails() {
        let cache = ReadThroughCache::new(CountingStore::new(), true);
        let Role::Leader(guard) = cache.join_or_lead("product:5") else {
            panic!("first caller leads");
        };
        let Role::Follower(receiver) = cache.join_or_lead("product:5") else {
            panic!("second caller follows");
        };

        drop(guard);

        assert!(wait_for_leader(receiver).await.is_none());
        assert!(cache.in_flight.is_empty());
        let value: Result<Item, ()> = cache
            .get_or_populate("product:5", TTL, || async { Ok(item(5)) })
            .await;
        assert_eq!(value, Ok(item(5)));
    }

    #[tokio::test]
    async fn disabled_single_flight_never_registers_flights() {
        let cache = ReadThroughCache::new(CountingStore::new(), false);

        let _: Result<Item, ()> = cache
            .get_or_populate("product:6", TTL, || async {
                assert!(cache.in_flight.is_empty());
                Ok(item(6))
            })
            .await;
    }
}
