//! Byte-bounded cache of decoded chunks.
//!
//! Decoding is the dominant per-request cost, and neighbouring tiles read
//! the same chunks. The cache is keyed by `(source id, location, level,
//! chunk)` and weighted by decoded size, so the budget is in bytes rather
//! than entries. A source that moves to a new file gets new keys; chunks
//! of the old file age out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use serde::Serialize;

use super::error::SourceError;
use super::geotiff::Chunk;

/// Default decoded-chunk budget.
pub const DEFAULT_READ_CACHE_SIZE: u64 = 512 * 1024 * 1024;

/// The raster a chunk was decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkSource {
    pub id: Arc<str>,
    pub location: Arc<str>,
}

impl ChunkSource {
    pub fn new(id: &str, location: &str) -> Self {
        Self {
            id: Arc::from(id),
            location: Arc::from(location),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub source: ChunkSource,
    pub level: usize,
    pub index: u32,
}

impl ChunkKey {
    pub fn new(source: &ChunkSource, level: usize, index: u32) -> Self {
        Self {
            source: source.clone(),
            level,
            index,
        }
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
    pub size_bytes: u64,
}

pub struct ChunkCache {
    cache: Cache<ChunkKey, Arc<Chunk>>,
    max_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChunkCache {
    pub fn new(max_bytes: u64) -> Self {
        let cache = Cache::builder()
            .weigher(|_key: &ChunkKey, chunk: &Arc<Chunk>| -> u32 {
                chunk.byte_size().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_bytes)
            .build();
        Self {
            cache,
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached chunk or decodes it with `load`.
    ///
    /// Concurrent callers for the same key wait for a single `load`; a
    /// failed load is not cached.
    pub fn get_or_load<F>(&self, key: ChunkKey, load: F) -> Result<Arc<Chunk>, SourceError>
    where
        F: FnOnce() -> Result<Chunk, SourceError>,
    {
        let mut loaded = false;
        let result = self.cache.try_get_with(key, || {
            loaded = true;
            load().map(Arc::new)
        });
        if loaded {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        result.map_err(|e| e.as_ref().clone())
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
            size_bytes: self.cache.weighted_size(),
        }
    }
}
