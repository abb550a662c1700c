//! Render telemetry.
//!
//! Lock-free counters bumped by the orchestrator and read as a point-in-time
//! snapshot by `/health` and the CLI.
//!
//! ```text
//! Renderer ─────► RenderMetrics ─────► MetricsSnapshot ─────► /health JSON
//!                (atomic counters)    (point-in-time copy)
//! ```
//!
//! # Example
//!
//! ```
//! use tilecutter::telemetry::RenderMetrics;
//!
//! let metrics = RenderMetrics::new();
//! metrics.request_started();
//! metrics.tile_rendered(false);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.requests, 1);
//! assert_eq!(snapshot.rendered, 1);
//! ```

mod metrics;
mod snapshot;

pub use metrics::RenderMetrics;
pub use snapshot::MetricsSnapshot;
