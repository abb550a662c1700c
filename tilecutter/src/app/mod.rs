//! Application bootstrap and lifecycle management.
//!
//! ```text
//! ConfigFile ─► build_loader ─► SnapshotCatalog ─┐
//!           └─► RasterReader ────────────────────┼─► Renderer ─► server::serve
//!                                                │
//!              refresh daemon (interval) ◄───────┘
//! ```
//!
//! [`TileServerApp`] owns the shutdown token; cancelling it stops the HTTP
//! server gracefully and ends the refresh daemon.

mod bootstrap;
mod error;

pub use bootstrap::{build_loader, TileServerApp};
pub use error::AppError;
