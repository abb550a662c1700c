//! The live catalog: lookups against an atomically swapped snapshot.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::loader::CatalogLoader;
use super::snapshot::CatalogSnapshot;
use super::types::{CatalogError, SourceDescriptor};
use crate::coord::GeoBBox;

/// Resolves a bounding box to candidate sources in precedence order.
///
/// Implementations must be side-effect free and safe to call from any
/// number of concurrent requests.
pub trait Catalog: Send + Sync {
    /// Every source intersecting `bbox`, highest precedence first.
    ///
    /// An empty result is not an error: the caller renders an all-nodata
    /// tile.
    fn lookup(&self, bbox: &GeoBBox) -> Result<Vec<Arc<SourceDescriptor>>, CatalogError>;

    /// Like [`lookup`](Self::lookup), dropping sources whose zoom range
    /// excludes `zoom`.
    fn lookup_for_zoom(
        &self,
        bbox: &GeoBBox,
        zoom: u8,
    ) -> Result<Vec<Arc<SourceDescriptor>>, CatalogError> {
        let mut found = self.lookup(bbox)?;
        found.retain(|s| s.serves_zoom(zoom));
        Ok(found)
    }

    /// The snapshot currently served, if any.
    fn snapshot(&self) -> Option<Arc<CatalogSnapshot>>;
}

/// A catalog backed by a loader and refreshed by whole-snapshot swaps.
///
/// ```text
/// loader.load() ──► CatalogSnapshot::new ──► swap Arc ──► lookups
///                    (validate + sort)         │
///                                              └─ in-flight lookups keep
///                                                 the Arc they cloned
/// ```
///
/// The lock is only held to clone or replace the `Arc`; lookups run
/// against their own clone with no lock held.
pub struct SnapshotCatalog {
    current: RwLock<Option<Arc<CatalogSnapshot>>>,
    loader: Arc<dyn CatalogLoader>,
}

impl SnapshotCatalog {
    /// Creates an empty catalog. Lookups fail until the first refresh.
    pub fn new(loader: Arc<dyn CatalogLoader>) -> Self {
        Self {
            current: RwLock::new(None),
            loader,
        }
    }

    /// Creates a catalog and performs the initial load.
    pub async fn load(loader: Arc<dyn CatalogLoader>) -> Result<Self, CatalogError> {
        let catalog = Self::new(loader);
        catalog.refresh().await?;
        Ok(catalog)
    }

    /// Loads a fresh snapshot and swaps it in.
    ///
    /// On failure the previous snapshot stays in service.
    pub async fn refresh(&self) -> Result<usize, CatalogError> {
        let sources = self.loader.load().await?;
        let snapshot = Arc::new(CatalogSnapshot::new(sources)?);
        let count = snapshot.len();
        self.install(snapshot);
        info!(
            loader = %self.loader.describe(),
            sources = count,
            "Catalog snapshot installed"
        );
        Ok(count)
    }

    /// Replaces the served snapshot.
    pub fn install(&self, snapshot: Arc<CatalogSnapshot>) {
        *self.current.write() = Some(snapshot);
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    fn current(&self) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        self.current
            .read()
            .clone()
            .ok_or_else(|| CatalogError::Unavailable("catalog has not been loaded".to_string()))
    }

    /// Spawns a task that refreshes the catalog every `interval` until
    /// `shutdown` is cancelled.
    pub fn spawn_refresh_daemon(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let catalog = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial load has
            // already happened.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        info!("Catalog refresh daemon shutting down");
                        break;
                    }

                    _ = ticker.tick() => {
                        if let Err(e) = catalog.refresh().await {
                            warn!(error = %e, "Catalog refresh failed; keeping previous snapshot");
                        }
                    }
                }
            }
        })
    }
}

impl Catalog for SnapshotCatalog {
    fn lookup(&self, bbox: &GeoBBox) -> Result<Vec<Arc<SourceDescriptor>>, CatalogError> {
        self.current()?.lookup(bbox)
    }

    fn lookup_for_zoom(
        &self,
        bbox: &GeoBBox,
        zoom: u8,
    ) -> Result<Vec<Arc<SourceDescriptor>>, CatalogError> {
        self.current()?.lookup_for_zoom(bbox, zoom)
    }

    fn snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current.read().clone()
    }
}
