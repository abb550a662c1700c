//! Tile rendering: catalog lookup, window reads, reprojection, compositing
//! and encoding for one request.
//!
//! ```text
//! RenderRequest ─► Renderer ─► Catalog::lookup_for_zoom ─► [s0, s1, ...]
//!                     │                                      │
//!                     │              RasterReader::read_window (blocking)
//!                     │                                      │
//!                     │                           reproject (rayon rows)
//!                     │                                      │
//!                     └──────────── CompositeTile::merge(rank = i)
//!                                                            │
//!                                               TileEncoder::encode ─► RenderedTile
//! ```

mod composite;
mod error;
mod orchestrator;
mod policy;
mod request;
mod resample;

pub use composite::{CompositeError, CompositeTile};
pub use error::RenderError;
pub use orchestrator::{
    RenderConfig, RenderStats, RenderedTile, Renderer, DEFAULT_MAX_CONCURRENT_RENDERS,
    DEFAULT_MAX_SOURCES, DEFAULT_RENDER_TIMEOUT, DEFAULT_SOURCE_CONCURRENCY,
};
pub use policy::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_MS,
};
pub use request::{parse_bands, parse_format, RenderRequest};
pub use resample::{reproject, Resampling};
