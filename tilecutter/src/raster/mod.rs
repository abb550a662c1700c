//! Source raster access.
//!
//! Opens GeoTIFF sources (local files, COGs over HTTP range requests) and
//! extracts the window of each that covers a render target.
//!
//! ```text
//! read_window(source, target)
//!     │
//!     ├─► HandlePool ── moka, keyed by location ──► Arc<Mutex<GeoTiffHandle>>
//!     │
//!     ├─► reproject target bbox ─► pick overview level ─► pixel region + pad
//!     │
//!     └─► ChunkCache ── moka, weighted by bytes ──► decoded f32 chunks
//!                                                       │
//!                                     assemble window + validity mask
//! ```

mod cache;
mod error;
mod geotiff;
mod pool;
mod reader;
mod remote;
mod types;

pub use cache::{CacheStats, ChunkCache, ChunkKey, ChunkSource, DEFAULT_READ_CACHE_SIZE};
pub use error::SourceError;
pub use geotiff::{parse_nodata, Chunk, GeoTiffHandle, LevelInfo, RasterMetadata, ReadSeek};
pub use pool::{HandlePool, SharedHandle};
pub use reader::{RasterReader, ReaderConfig, DEFAULT_MAX_WINDOW_PIXELS, DEFAULT_OPEN_HANDLES};
pub use remote::{HttpRangeReader, RemoteConfig, SourceLocation, DEFAULT_BLOCK_SIZE};
pub use types::RasterWindow;
