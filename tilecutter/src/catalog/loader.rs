//! Catalog loaders: where snapshots come from.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tracing::debug;

use super::types::{CatalogError, SourceDescriptor};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces the full set of source descriptors for a new snapshot.
///
/// Loaders are called on startup and on every refresh. They return the
/// whole catalog; the caller validates, sorts and swaps it in.
pub trait CatalogLoader: Send + Sync {
    /// Loads every cataloged source.
    fn load(&self) -> BoxFuture<'_, Result<Vec<SourceDescriptor>, CatalogError>>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Loads descriptors from a JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonCatalogLoader {
    path: PathBuf,
}

impl JsonCatalogLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogLoader for JsonCatalogLoader {
    fn load(&self) -> BoxFuture<'_, Result<Vec<SourceDescriptor>, CatalogError>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CatalogError::Unavailable(format!(
                        "catalog file {} not found",
                        self.path.display()
                    ))
                } else {
                    CatalogError::Io(e)
                }
            })?;
            let sources: Vec<SourceDescriptor> = serde_json::from_slice(&bytes)?;
            debug!(path = %self.path.display(), count = sources.len(), "Read catalog file");
            Ok(sources)
        })
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Serves a fixed list of descriptors.
///
/// Useful for one-off renders and for embedding tilecutter with a catalog
/// built in code.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogLoader {
    sources: Vec<SourceDescriptor>,
}

impl StaticCatalogLoader {
    pub fn new(sources: Vec<SourceDescriptor>) -> Self {
        Self { sources }
    }
}

impl CatalogLoader for StaticCatalogLoader {
    fn load(&self) -> BoxFuture<'_, Result<Vec<SourceDescriptor>, CatalogError>> {
        let sources = self.sources.clone();
        Box::pin(async move { Ok(sources) })
    }

    fn describe(&self) -> String {
        format!("static:{} sources", self.sources.len())
    }
}
