//! Router statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for how requests were served
#[derive(Debug, Default)]
pub struct RouterStats {
    network: AtomicU64,
    cache_hits: AtomicU64,
    cache_fallbacks: AtomicU64,
    offline_pages: AtomicU64,
    offline_errors: AtomicU64,
    passthroughs: AtomicU64,
    cache_writes: AtomicU64,
    write_failures: AtomicU64,
}

/// Point-in-time copy of [`RouterStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub network: u64,
    pub cache_hits: u64,
    pub cache_fallbacks: u64,
    pub offline_pages: u64,
    pub offline_errors: u64,
    pub passthroughs: u64,
    pub cache_writes: u64,
    pub write_failures: u64,
}

impl RouterStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Served straight from the network
    pub fn record_network(&self) {
        self.network.fetch_add(1, Ordering::Relaxed);
    }

    /// Served from cache before trying the network (cache-first)
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Served from cache after the network failed
    pub fn record_cache_fallback(&self) {
        self.cache_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Served the offline page
    pub fn record_offline_page(&self) {
        self.offline_pages.fetch_add(1, Ordering::Relaxed);
    }

    /// Served a synthesized 503
    pub fn record_offline_error(&self) {
        self.offline_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_passthrough(&self) {
        self.passthroughs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            network: self.network.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_fallbacks: self.cache_fallbacks.load(Ordering::Relaxed),
            offline_pages: self.offline_pages.load(Ordering::Relaxed),
            offline_errors: self.offline_errors.load(Ordering::Relaxed),
            passthroughs: self.passthroughs.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Fraction of intercepted requests answered without the network (0.0 to 1.0)
    pub fn offline_ratio(&self) -> f64 {
        let s = self.snapshot();
        let served_offline = s.cache_fallbacks + s.offline_pages + s.offline_errors;
        let total = served_offline + s.network + s.cache_hits;
        if total == 0 {
            0.0
        } else {
            served_offline as f64 / total as f64
        }
    }
}
