//! Bounded pool of open GeoTIFF handles.

use std::sync::{Arc, OnceLock};

use moka::sync::Cache;
use parking_lot::Mutex;
use reqwest::blocking::Client;
use tracing::debug;

use super::error::SourceError;
use super::geotiff::GeoTiffHandle;
use super::remote::{HttpRangeReader, RemoteConfig, SourceLocation};

/// A pooled handle. The mutex serializes access to one source; distinct
/// sources are read in parallel.
pub type SharedHandle = Arc<Mutex<GeoTiffHandle>>;

/// Keeps at most `capacity` sources open, keyed by location.
///
/// Opening is idempotent: concurrent first reads of a source race on one
/// open and share its handle. Evicted handles close when the last reader
/// drops its `Arc`.
pub struct HandlePool {
    handles: Cache<String, SharedHandle>,
    remote: RemoteConfig,
    client: OnceLock<Client>,
}

impl HandlePool {
    pub fn new(capacity: u64, remote: RemoteConfig) -> Self {
        Self {
            handles: Cache::builder().max_capacity(capacity.max(1)).build(),
            remote,
            client: OnceLock::new(),
        }
    }

    /// Returns the open handle for `location`, opening it on first use.
    ///
    /// Blocking; call from a blocking thread.
    pub fn acquire(&self, location: &str) -> Result<SharedHandle, SourceError> {
        self.handles
            .try_get_with(location.to_string(), || {
                self.open(location).map(|h| Arc::new(Mutex::new(h)))
            })
            .map_err(|e| e.as_ref().clone())
    }

    /// Drops the pooled handle so the next acquire reopens the source.
    pub fn invalidate(&self, location: &str) {
        debug!(location, "Invalidating source handle");
        self.handles.invalidate(location);
    }

    /// Number of open handles.
    pub fn len(&self) -> u64 {
        self.handles.run_pending_tasks();
        self.handles.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn open(&self, location: &str) -> Result<GeoTiffHandle, SourceError> {
        match SourceLocation::parse(location)? {
            SourceLocation::Local(path) => GeoTiffHandle::open_path(path),
            SourceLocation::Http(url) => {
                let reader =
                    HttpRangeReader::open(self.client()?.clone(), &url, self.remote.block_size)?;
                debug!(url = %url, bytes = reader.len(), "Opened remote source");
                GeoTiffHandle::open(Box::new(reader))
            }
        }
    }

    /// The shared HTTP client, built on first remote open so that it is
    /// created on a blocking thread.
    fn client(&self) -> Result<&Client, SourceError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = self.remote.build_client()?;
        Ok(self.client.get_or_init(|| client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_unavailable_and_not_pooled() {
        let pool = HandlePool::new(4, RemoteConfig::default());
        assert!(matches!(
            pool.acquire("/nonexistent/dem.tif"),
            Err(SourceError::Unavailable(_))
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_corrupt() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a tiff").unwrap();
        let pool = HandlePool::new(4, RemoteConfig::default());
        assert!(matches!(
            pool.acquire(file.path().to_str().unwrap()),
            Err(SourceError::Corrupt(_))
        ));
    }
}
