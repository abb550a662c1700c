//! Serializable view of the render counters.

use serde::Serialize;

use crate::raster::CacheStats;

/// Counters at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub rendered: u64,
    /// Rendered tiles with no valid pixel.
    pub empty: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub source_reads: u64,
    pub source_failures: u64,
    pub retries: u64,
    pub mean_render_ms: f64,
    /// Decoded chunk cache.
    pub cache: CacheStats,
}

impl MetricsSnapshot {
    /// Fraction of chunk lookups served from cache.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache.hits + self.cache.misses;
        if total == 0 {
            0.0
        } else {
            self.cache.hits as f64 / total as f64
        }
    }
}
