//! Per-request render pipeline.
//!
//! ```text
//! Received ─► CatalogLookup ─┬─► NoSources ─────────────────────────► Encoding ─► Done
//!                            │
//!                            └─► Reading(i) ─► Reprojecting(i) ─► Merging(i)
//!                                    ▲                                 │
//!                                    └──────── next i ◄────────────────┤
//!                                                                      └─► Encoding ─► Done
//! ```
//!
//! Any state can end in `Failed`. Source reads run on blocking threads,
//! `source_concurrency` at a time, and are consumed in precedence order so
//! the merge rank equals the candidate's position. Once the composite is
//! full the remaining reads are cancelled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::composite::CompositeTile;
use super::error::RenderError;
use super::policy::RetryPolicy;
use super::request::RenderRequest;
use super::resample::{reproject, Resampling};
use crate::catalog::{Catalog, SourceDescriptor};
use crate::coord::{GeoBBox, GridSpec, TileCoord, TileGrid, TransformerCache, DEFAULT_TILE_SIZE};
use crate::encode::{encoder_for, OutputFormat, TileEncoder};
use crate::raster::{RasterReader, RasterWindow, SourceError};
use crate::telemetry::{MetricsSnapshot, RenderMetrics};

/// Default whole-request deadline.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on candidates read for one tile.
pub const DEFAULT_MAX_SOURCES: usize = 16;

/// Default number of sources read in parallel within one request.
pub const DEFAULT_SOURCE_CONCURRENCY: usize = 4;

/// Default number of requests rendering at once.
pub const DEFAULT_MAX_CONCURRENT_RENDERS: usize = 64;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub tile_size: u32,
    pub resampling: Resampling,
    /// Coverage threshold in (0, 1]; `None` uses the kernel's default.
    pub min_coverage: Option<f64>,
    pub timeout: Duration,
    pub max_sources: usize,
    pub source_concurrency: usize,
    pub max_concurrent_renders: usize,
    /// Fail with `NoCoverage` instead of returning an empty tile when
    /// every pixel is nodata and a source failed.
    pub require_coverage: bool,
    pub retry: RetryPolicy,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            resampling: Resampling::default(),
            min_coverage: None,
            timeout: DEFAULT_RENDER_TIMEOUT,
            max_sources: DEFAULT_MAX_SOURCES,
            source_concurrency: DEFAULT_SOURCE_CONCURRENCY,
            max_concurrent_renders: DEFAULT_MAX_CONCURRENT_RENDERS,
            require_coverage: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// What happened while rendering one tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    /// Candidates returned by the catalog, after the source cap.
    pub candidates: usize,
    /// Sources whose window was merged.
    pub used: usize,
    /// Sources skipped after an error.
    pub failed: usize,
    /// Valid pixels in the tile, excluding the buffer.
    pub valid_pixels: usize,
    pub elapsed: Duration,
}

/// An encoded tile.
#[derive(Debug, Clone)]
pub struct RenderedTile {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub format: OutputFormat,
    pub stats: RenderStats,
}

/// Outcome of one source, tagged with its merge rank.
struct SourceOutcome {
    rank: usize,
    source: Arc<SourceDescriptor>,
    result: Result<Option<RasterWindow>, SourceError>,
}

/// Renders tiles from a catalog of sources.
pub struct Renderer {
    catalog: Arc<dyn Catalog>,
    reader: Arc<RasterReader>,
    grid: TileGrid,
    config: RenderConfig,
    permits: Arc<Semaphore>,
    metrics: Arc<RenderMetrics>,
}

impl Renderer {
    pub fn new(catalog: Arc<dyn Catalog>, reader: Arc<RasterReader>, config: RenderConfig) -> Self {
        Self {
            catalog,
            reader,
            grid: TileGrid::web_mercator(config.tile_size),
            permits: Arc::new(Semaphore::new(config.max_concurrent_renders.max(1))),
            config,
            metrics: Arc::new(RenderMetrics::new()),
        }
    }

    /// Shares an existing metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<RenderMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn metrics(&self) -> &Arc<RenderMetrics> {
        &self.metrics
    }

    /// Counters including the chunk cache.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot_with_cache(self.reader.cache_stats())
    }

    /// Candidates for a tile in merge order, capped at `max_sources`.
    pub fn candidates(&self, tile: &TileCoord) -> Result<Vec<Arc<SourceDescriptor>>, RenderError> {
        self.lookup(&self.grid.tile_bbox(tile), tile.zoom)
    }

    fn lookup(&self, bbox: &GeoBBox, zoom: u8) -> Result<Vec<Arc<SourceDescriptor>>, RenderError> {
        let mut found = self.catalog.lookup_for_zoom(bbox, zoom)?;
        found.truncate(self.config.max_sources);
        Ok(found)
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<RenderedTile, RenderError> {
        self.render_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Renders `request`, aborting when `cancel` fires or the request
    /// deadline passes.
    #[instrument(skip_all, fields(tile = %request.tile, format = %request.format))]
    pub async fn render_with_cancel(
        &self,
        request: &RenderRequest,
        cancel: CancellationToken,
    ) -> Result<RenderedTile, RenderError> {
        let started = Instant::now();
        self.metrics.request_started();
        debug!(state = "Received");

        let encoder = encoder_for(request.format);
        if let Err(e) = request.validate(encoder.as_ref()) {
            self.metrics.render_failed();
            return Err(e);
        }

        // Dropping the pipeline, on timeout or on return, stops its reads.
        let work = cancel.child_token();
        let _guard = work.clone().drop_guard();

        let timeout = self.config.timeout;
        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(RenderError::Cancelled),

            outcome = tokio::time::timeout(timeout, self.run(request, encoder, work)) => {
                outcome.unwrap_or(Err(RenderError::RequestTimeout(timeout)))
            }
        };

        match &result {
            Ok(tile) => {
                self.metrics.tile_rendered(tile.stats.valid_pixels == 0);
                self.metrics.add_render_time(started.elapsed());
                debug!(
                    state = "Done",
                    used = tile.stats.used,
                    failed = tile.stats.failed,
                    bytes = tile.bytes.len(),
                    "Tile rendered"
                );
            }
            Err(RenderError::RequestTimeout(_)) => {
                self.metrics.render_timed_out();
                warn!(state = "Failed", ?timeout, "Render timed out");
            }
            Err(RenderError::Cancelled) => {
                self.metrics.render_cancelled();
                debug!(state = "Failed", "Render cancelled");
            }
            Err(e) => {
                self.metrics.render_failed();
                debug!(state = "Failed", error = %e, "Render failed");
            }
        }
        result.map(|mut tile| {
            tile.stats.elapsed = started.elapsed();
            tile
        })
    }

    async fn run(
        &self,
        request: &RenderRequest,
        encoder: Arc<dyn TileEncoder>,
        cancel: CancellationToken,
    ) -> Result<RenderedTile, RenderError> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| RenderError::Internal("render semaphore closed".to_string()))?;

        let buffered = self
            .grid
            .tile_grid_buffered(&request.tile, encoder.buffer());
        let band_map = request.band_map();

        debug!(state = "CatalogLookup");
        let candidates = self.lookup(&buffered.grid.bbox, request.tile.zoom)?;

        let mut composite = CompositeTile::new(buffered.grid, band_map.len(), buffered.crop);
        let mut stats = RenderStats {
            candidates: candidates.len(),
            ..RenderStats::default()
        };

        if candidates.is_empty() {
            debug!(state = "NoSources");
        } else {
            self.composite_sources(candidates, &band_map, &mut composite, &mut stats, &cancel)
                .await?;
        }

        let mut valid_pixels = 0;
        composite.for_each_cropped(|_, _, _, valid| valid_pixels += usize::from(valid));
        stats.valid_pixels = valid_pixels;

        if self.config.require_coverage && valid_pixels == 0 && stats.failed > 0 {
            return Err(RenderError::NoCoverage {
                failed: stats.failed,
            });
        }

        debug!(state = "Encoding", valid_pixels);
        let content_type = encoder.content_type();
        let bytes = tokio::task::spawn_blocking(move || encoder.encode(&composite)).await??;

        Ok(RenderedTile {
            bytes: Bytes::from(bytes),
            content_type,
            format: request.format,
            stats,
        })
    }

    async fn composite_sources(
        &self,
        candidates: Vec<Arc<SourceDescriptor>>,
        band_map: &[usize],
        composite: &mut CompositeTile,
        stats: &mut RenderStats,
        cancel: &CancellationToken,
    ) -> Result<(), RenderError> {
        let remaining = cancel.child_token();
        let target = composite.grid.clone();
        let identity: Vec<usize> = (0..band_map.len()).collect();

        let mut reads = stream::iter(candidates.into_iter().enumerate())
            .map(|(rank, source)| {
                self.read_source(rank, source, &target, band_map, remaining.clone())
            })
            .buffered(self.config.source_concurrency.max(1));

        while let Some(outcome) = reads.next().await {
            let SourceOutcome {
                rank,
                source,
                result,
            } = outcome;
            match result {
                Ok(Some(window)) => {
                    debug!(source = %source.id, rank, state = "Merging");
                    let written = composite
                        .merge(&window, &identity, rank as u32)
                        .map_err(|e| RenderError::Internal(e.to_string()))?;
                    stats.used += 1;
                    debug!(source = %source.id, written, "Merged source");
                    if composite.is_full() {
                        debug!(
                            skipped = stats.candidates - rank - 1,
                            "Tile fully covered; skipping remaining sources"
                        );
                        remaining.cancel();
                        break;
                    }
                }
                Ok(None) => {
                    debug!(source = %source.id, "Source does not overlap tile");
                }
                Err(SourceError::Cancelled) if cancel.is_cancelled() => {
                    return Err(RenderError::Cancelled);
                }
                Err(e) => {
                    stats.failed += 1;
                    self.metrics.source_failed();
                    warn!(source = %source.id, error = %e, "Skipping source");
                }
            }
        }
        Ok(())
    }

    /// Reads and reprojects one source, retrying transient failures.
    async fn read_source(
        &self,
        rank: usize,
        source: Arc<SourceDescriptor>,
        target: &GridSpec,
        band_map: &[usize],
        cancel: CancellationToken,
    ) -> SourceOutcome {
        let kernel = if source.band_kind.is_interpolable() {
            self.config.resampling
        } else {
            Resampling::Nearest
        };
        let min_coverage = self
            .config
            .min_coverage
            .unwrap_or_else(|| kernel.default_min_coverage());

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.metrics.source_read();
            debug!(source = %source.id, rank, attempt, state = "Reading");

            let job = ReadJob {
                reader: Arc::clone(&self.reader),
                source: Arc::clone(&source),
                target: target.clone(),
                band_map: band_map.to_vec(),
                kernel,
                min_coverage,
                cancel: cancel.clone(),
            };
            let result = tokio::task::spawn_blocking(move || job.run())
                .await
                .unwrap_or_else(|e| Err(SourceError::Corrupt(format!("read task failed: {e}"))));

            match result {
                Err(e) if self.config.retry.should_retry(&e, attempt) && !cancel.is_cancelled() => {
                    let delay = self.config.retry.delay_for_attempt(attempt).unwrap_or_default();
                    self.metrics.source_retried();
                    debug!(source = %source.id, attempt, ?delay, error = %e, "Retrying source");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return SourceOutcome { rank, source, result: Err(SourceError::Cancelled) };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                result => return SourceOutcome { rank, source, result },
            }
        }
    }
}

/// Blocking part of one source read.
struct ReadJob {
    reader: Arc<RasterReader>,
    source: Arc<SourceDescriptor>,
    target: GridSpec,
    band_map: Vec<usize>,
    kernel: Resampling,
    min_coverage: f64,
    cancel: CancellationToken,
}

impl ReadJob {
    fn run(self) -> Result<Option<RasterWindow>, SourceError> {
        let padding = self.kernel.radius();
        let window = match self
            .reader
            .read_window(&self.source, &self.target, padding, &self.cancel)?
        {
            Some(window) => window.select_bands(&self.band_map)?,
            None => return Ok(None),
        };
        if self.cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        debug!(source = %self.source.id, kernel = %self.kernel, state = "Reprojecting");
        let transformer = TransformerCache::global().get(self.target.srs(), &window.srs)?;
        Ok(Some(reproject(
            &window,
            &self.target,
            self.kernel,
            self.min_coverage,
            &transformer,
        )))
    }
}
