//! Atomic render counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::snapshot::MetricsSnapshot;
use crate::raster::CacheStats;

/// Counters shared by every request of one renderer.
///
/// All updates use relaxed ordering; a snapshot is a consistent view of
/// each counter, not of the set.
#[derive(Debug)]
pub struct RenderMetrics {
    started: Instant,
    requests: AtomicU64,
    rendered: AtomicU64,
    empty: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    cancelled: AtomicU64,
    source_reads: AtomicU64,
    source_failures: AtomicU64,
    retries: AtomicU64,
    render_micros: AtomicU64,
}

impl Default for RenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            rendered: AtomicU64::new(0),
            empty: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            source_reads: AtomicU64::new(0),
            source_failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            render_micros: AtomicU64::new(0),
        }
    }

    pub fn request_started(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful render; `empty` when no pixel had data.
    pub fn tile_rendered(&self, empty: bool) {
        self.rendered.fetch_add(1, Ordering::Relaxed);
        if empty {
            self.empty.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn render_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_timed_out(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn source_read(&self) {
        self.source_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn source_failed(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn source_retried(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_render_time(&self, elapsed: std::time::Duration) {
        self.render_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy, combined with the read cache counters.
    pub fn snapshot_with_cache(&self, cache: CacheStats) -> MetricsSnapshot {
        let rendered = self.rendered.load(Ordering::Relaxed);
        let render_micros = self.render_micros.load(Ordering::Relaxed);
        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            rendered,
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            source_reads: self.source_reads.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            mean_render_ms: if rendered == 0 {
                0.0
            } else {
                render_micros as f64 / rendered as f64 / 1000.0
            },
            cache,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_with_cache(CacheStats::default())
    }
}
