//! Bounded TTL cache for search results.
//!
//! moka handles LRU-style eviction at `search_cache_size` entries and
//! expiry at `search_cache_ttl`. Entries are immutable snapshots behind an
//! `Arc`; hit/miss counters feed the cache-stats endpoint.

use crate::config::CacheConfig;
use crate::search::RankedResults;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use utoipa::ToSchema;

pub struct SearchCache {
    cache: moka::future::Cache<String, Arc<RankedResults>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl SearchCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache: moka::future::Cache::builder()
                .max_capacity(config.search_cache_size)
                .time_to_live(Duration::from_secs(config.search_cache_ttl))
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<RankedResults>> {
        let found = self.cache.get(key).await;
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub async fn insert(&self, key: String, results: Arc<RankedResults>) {
        self.cache.insert(key, results).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries: self.cache.entry_count(),
            hits,
            misses,
            hit_rate: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
        }
    }
}
