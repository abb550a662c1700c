//! HTTP surface.
//!
//! ```text
//! GET /{z}/{x}/{y}.{ext}[?bands=1,2] ─► RenderRequest ─► Renderer ─► bytes
//! GET /health                        ─► catalog state + metrics snapshot
//! ```
//!
//! Handlers only parse and map errors; everything else happens in
//! [`Renderer`].

mod handlers;
mod response;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::render::Renderer;

pub use handlers::HealthReport;
pub use response::status_for;

/// Default `Cache-Control` for tiles.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=3600";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub renderer: Arc<Renderer>,
    pub cache_control: HeaderValue,
}

impl AppState {
    pub fn new(renderer: Arc<Renderer>) -> Self {
        Self {
            renderer,
            cache_control: HeaderValue::from_static(DEFAULT_CACHE_CONTROL),
        }
    }

    pub fn with_cache_control(mut self, value: HeaderValue) -> Self {
        self.cache_control = value;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/:z/:x/:file", get(handlers::tile))
        .with_state(state)
}

/// Serves until `shutdown` is cancelled, then lets in-flight requests
/// finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    info!(?addr, "Tile server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Tile server stopped");
    Ok(())
}
