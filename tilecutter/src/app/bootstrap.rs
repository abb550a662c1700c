//! Application bootstrap implementation.
//!
//! Wires the catalog, raster reader and renderer from a [`ConfigFile`]
//! and owns the background tasks that must stop with the server.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::error::AppError;
use crate::catalog::{Catalog, CatalogLoader, JsonCatalogLoader, SnapshotCatalog};
use crate::config::ConfigFile;
use crate::raster::RasterReader;
use crate::render::Renderer;
use crate::server::{self, AppState};

/// A wired tile server.
///
/// Startup order:
/// 1. catalog loader (PostGIS or JSON file) and the first snapshot load;
/// 2. raster reader with its handle pool and chunk cache;
/// 3. renderer over both;
/// 4. the catalog refresh daemon, for long-running servers.
///
/// ```ignore
/// let app = TileServerApp::start(config).await?;
/// app.serve().await?;
/// app.shutdown().await;
/// ```
pub struct TileServerApp {
    config: ConfigFile,
    catalog: Arc<SnapshotCatalog>,
    renderer: Arc<Renderer>,
    shutdown: CancellationToken,
    refresh_daemon: Option<JoinHandle<()>>,
}

impl TileServerApp {
    /// Starts a long-running server.
    ///
    /// A failed first load is logged, not returned: `/health` reports 503
    /// and tiles fail with `CatalogUnavailable` until a refresh succeeds.
    pub async fn start(config: ConfigFile) -> Result<Self, AppError> {
        let mut app = Self::build(config)?;
        if let Err(e) = app.catalog.refresh().await {
            warn!(error = %e, "Initial catalog load failed; serving 503 until a refresh succeeds");
        }

        let interval = app.config.catalog.refresh_interval;
        app.refresh_daemon = Some(
            app.catalog
                .spawn_refresh_daemon(interval, app.shutdown.child_token()),
        );
        info!(?interval, "Catalog refresh daemon started");
        Ok(app)
    }

    /// Builds the pipeline for one-off commands. The catalog must load.
    pub async fn open(config: ConfigFile) -> Result<Self, AppError> {
        let app = Self::build(config)?;
        app.catalog.refresh().await?;
        Ok(app)
    }

    fn build(config: ConfigFile) -> Result<Self, AppError> {
        let loader = build_loader(&config)?;
        info!(catalog = %loader.describe(), "Catalog configured");
        let catalog = Arc::new(SnapshotCatalog::new(loader));

        let reader = Arc::new(RasterReader::new(&config.reader_config()));
        let renderer = Arc::new(Renderer::new(
            Arc::clone(&catalog) as Arc<dyn Catalog>,
            reader,
            config.render_config(),
        ));
        info!(
            tile_size = config.render.tile_size,
            resampling = %config.render.resampling,
            read_cache_size = config.cache.read_cache_size,
            "Renderer ready"
        );

        Ok(Self {
            config,
            catalog,
            renderer,
            shutdown: CancellationToken::new(),
            refresh_daemon: None,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<SnapshotCatalog> {
        &self.catalog
    }

    pub fn renderer(&self) -> &Arc<Renderer> {
        &self.renderer
    }

    /// Cancelling this token stops the server and the refresh daemon.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> AppState {
        AppState::new(Arc::clone(&self.renderer))
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn serve(&self) -> Result<(), AppError> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AppError::Bind { addr, source })?;
        self.serve_on(listener).await
    }

    /// Serves on an already bound listener until shutdown.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<(), AppError> {
        server::serve(listener, self.state(), self.shutdown.child_token())
            .await
            .map_err(AppError::Serve)
    }

    /// Stops background tasks and waits for them.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(daemon) = self.refresh_daemon.take() {
            if let Err(e) = daemon.await {
                warn!(error = %e, "Catalog refresh daemon ended abnormally");
            }
        }
        info!("Tile server shut down");
    }
}

/// Picks the catalog backend: PostGIS when a database URL is set,
/// otherwise the JSON file.
pub fn build_loader(config: &ConfigFile) -> Result<Arc<dyn CatalogLoader>, AppError> {
    if let Some(loader) = database_loader(config)? {
        return Ok(loader);
    }
    match &config.catalog.file {
        Some(path) => Ok(Arc::new(JsonCatalogLoader::new(path.clone()))),
        None => Err(AppError::NoCatalog),
    }
}

#[cfg(feature = "postgis")]
fn database_loader(config: &ConfigFile) -> Result<Option<Arc<dyn CatalogLoader>>, AppError> {
    match config.postgis_config() {
        Some(postgis) => {
            let loader = crate::catalog::PostgisCatalogLoader::new(&postgis)?;
            Ok(Some(Arc::new(loader)))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "postgis"))]
fn database_loader(config: &ConfigFile) -> Result<Option<Arc<dyn CatalogLoader>>, AppError> {
    if config.catalog.database_url.is_some() && config.catalog.file.is_none() {
        return Err(AppError::Catalog(crate::catalog::CatalogError::Unavailable(
            "built without PostGIS support".to_string(),
        )));
    }
    Ok(None)
}
