//! Spatial catalog of source rasters.
//!
//! The catalog maps a bounding box to the source rasters that cover it,
//! already sorted into the total precedence order the compositor paints in.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   load()    ┌─────────────────┐  swap   ┌─────────────────┐
//! │ CatalogLoader│ ──────────► │ CatalogSnapshot │ ──────► │ SnapshotCatalog │
//! │ (JSON/PostGIS)│            │ validate + sort │         │  RwLock<Arc<_>> │
//! └──────────────┘             └─────────────────┘         └────────┬────────┘
//!                                                                   │ lookup(bbox)
//!                                                                   ▼
//!                                                      Vec<Arc<SourceDescriptor>>
//! ```
//!
//! Snapshots are never mutated after construction. A refresh builds a whole
//! new snapshot and replaces the pointer; requests already holding the old
//! snapshot finish against it.

mod loader;
#[cfg(feature = "postgis")]
mod postgis;
mod service;
mod snapshot;
mod types;

pub use loader::{BoxFuture, CatalogLoader, JsonCatalogLoader, StaticCatalogLoader};
#[cfg(feature = "postgis")]
pub use postgis::{PostgisCatalogLoader, PostgisConfig};
pub use service::{Catalog, SnapshotCatalog};
pub use snapshot::CatalogSnapshot;
pub use types::{BandKind, CatalogError, SourceDescriptor};

/// Default footprint table name.
pub const DEFAULT_TABLE: &str = "footprints";
