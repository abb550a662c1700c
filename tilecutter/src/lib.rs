//! tilecutter - on-demand elevation and raster tiles
//!
//! Renders web-map tiles from a catalog of GeoTIFF sources. For each tile
//! the renderer looks up the covering sources, reads and reprojects their
//! windows, composites them by priority and encodes the result as
//! Terrarium, Terrain-RGB, GeoTIFF, raw float or hillshade.
//!
//! ```text
//! GET /z/x/y.ext ─► server ─► render ─► catalog ─► raster ─► encode
//! ```

pub mod app;
pub mod catalog;
pub mod config;
pub mod coord;
pub mod encode;
pub mod logging;
pub mod raster;
pub mod render;
pub mod server;
pub mod telemetry;

/// Crate version, reported by `/health` and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
