use std::sync::Arc;
use std::time::Duration;

use crate::application::products::ProductService;
use crate::application::repos::HealthRepo;
use crate::cache::{CacheKeys, ReadThroughCache};
use crate::config::ListingSettings;

#[derive(Clone)]
pub struct ApiState {
    pub products: Arc<ProductService>,
    pub cache: ReadThroughCache,
    pub keys: CacheKeys,
    pub cache_ttl: Duration,
    pub listing: ListingSettings,
    pub health: Arc<dyn HealthRepo>,
}
