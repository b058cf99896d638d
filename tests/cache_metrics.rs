use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catalog::cache::{
    CacheConfig, CacheError, CacheStore, METRIC_CACHE_BACKEND_ERROR_TOTAL,
    METRIC_CACHE_COALESCED_TOTAL, METRIC_CACHE_DECODE_ERROR_TOTAL, METRIC_CACHE_HIT_TOTAL,
    METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_POPULATE_MS, MemoryCacheStore, ReadThroughCache,
};
use catalog::infra::telemetry;
use metrics_util::debugging::DebuggingRecorder;

const TTL: Duration = Duration::from_secs(30);

struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }
}

async fn fetch(cache: &ReadThroughCache, key: &str, value: u32) -> u32 {
    cache
        .get_or_populate(key, TTL, || async move { Ok::<_, std::convert::Infallible>(value) })
        .await
        .unwrap_or_else(|never| match never {})
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let memory: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new(&CacheConfig::default()));
    let cache = ReadThroughCache::new(Arc::clone(&memory), true);

    // miss + populate, then hit
    assert_eq!(fetch(&cache, "product:1", 7).await, 7);
    assert_eq!(fetch(&cache, "product:1", 8).await, 7);

    // undecodable entry
    memory
        .set("product:2", b"{not json".to_vec(), TTL)
        .await
        .expect("memory store accepts writes");
    assert_eq!(fetch(&cache, "product:2", 2).await, 2);

    // coalesced follower
    let slow = cache.get_or_populate("product:3", TTL, || async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, std::convert::Infallible>(3_u32)
    });
    let (leader, follower) = tokio::join!(slow, fetch(&cache, "product:3", 99));
    assert_eq!(leader.unwrap_or_else(|never| match never {}), 3);
    assert_eq!(follower, 3);

    // backend failure
    let broken = ReadThroughCache::new(Arc::new(UnreachableStore), true);
    assert_eq!(fetch(&broken, "product:4", 4).await, 4);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        METRIC_CACHE_HIT_TOTAL,
        METRIC_CACHE_MISS_TOTAL,
        METRIC_CACHE_DECODE_ERROR_TOTAL,
        METRIC_CACHE_BACKEND_ERROR_TOTAL,
        METRIC_CACHE_COALESCED_TOTAL,
        METRIC_CACHE_POPULATE_MS,
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
