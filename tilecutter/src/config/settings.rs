//! Settings for each `[section]` of `config.ini`, and their conversion
//! into the component configs.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::DEFAULT_TABLE;
use crate::coord::DEFAULT_TILE_SIZE;
use crate::logging::{
    default_log_dir, LogRotation, LoggingConfig, DEFAULT_LOG_FILE, DEFAULT_LOG_LEVEL,
};
use crate::raster::{
    ReaderConfig, RemoteConfig, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_WINDOW_PIXELS,
    DEFAULT_OPEN_HANDLES, DEFAULT_READ_CACHE_SIZE,
};
use crate::render::{
    RenderConfig, Resampling, RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT_RENDERS, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_SOURCES, DEFAULT_RENDER_TIMEOUT, DEFAULT_SOURCE_CONCURRENCY,
};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default interval between catalog reloads.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Default PostGIS pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Default PostGIS acquire timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything `config.ini` can set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub server: ServerSettings,
    pub catalog: CatalogSettings,
    pub render: RenderSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub remote: RemoteSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

/// Where the catalog comes from. When both are set the database wins.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSettings {
    pub database_url: Option<String>,
    /// JSON catalog file.
    pub file: Option<PathBuf>,
    pub table: String,
    pub refresh_interval: Duration,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            database_url: None,
            file: None,
            table: DEFAULT_TABLE.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub tile_size: u32,
    pub resampling: Resampling,
    /// `None` leaves the threshold to the resampling kernel.
    pub min_coverage: Option<f64>,
    pub timeout: Duration,
    pub max_sources: usize,
    pub source_concurrency: usize,
    pub max_concurrent_renders: usize,
    pub max_window_pixels: u64,
    pub require_coverage: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            resampling: Resampling::default(),
            min_coverage: None,
            timeout: DEFAULT_RENDER_TIMEOUT,
            max_sources: DEFAULT_MAX_SOURCES,
            source_concurrency: DEFAULT_SOURCE_CONCURRENCY,
            max_concurrent_renders: DEFAULT_MAX_CONCURRENT_RENDERS,
            max_window_pixels: DEFAULT_MAX_WINDOW_PIXELS,
            require_coverage: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Byte budget of the decoded chunk cache.
    pub read_cache_size: u64,
    pub open_handles: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            read_cache_size: DEFAULT_READ_CACHE_SIZE,
            open_handles: DEFAULT_OPEN_HANDLES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Attempts per source read, including the first. `1` disables retry.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Bytes fetched per HTTP range request.
    pub block_size: usize,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        let remote = RemoteConfig::default();
        Self {
            connect_timeout: remote.connect_timeout,
            read_timeout: remote.read_timeout,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
    pub level: String,
    pub rotation: LogRotation,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
            file: DEFAULT_LOG_FILE.to_string(),
            level: DEFAULT_LOG_LEVEL.to_string(),
            rotation: LogRotation::default(),
        }
    }
}

impl ConfigFile {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.retry;
        if retry.max_attempts <= 1 {
            return RetryPolicy::None;
        }
        RetryPolicy::ExponentialBackoff {
            max_attempts: retry.max_attempts,
            initial_delay: Duration::from_millis(retry.initial_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms.max(retry.initial_delay_ms)),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    pub fn render_config(&self) -> RenderConfig {
        let render = &self.render;
        RenderConfig {
            tile_size: render.tile_size,
            resampling: render.resampling,
            min_coverage: render.min_coverage,
            timeout: render.timeout,
            max_sources: render.max_sources,
            source_concurrency: render.source_concurrency,
            max_concurrent_renders: render.max_concurrent_renders,
            require_coverage: render.require_coverage,
            retry: self.retry_policy(),
        }
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            max_window_pixels: self.render.max_window_pixels,
            read_cache_size: self.cache.read_cache_size,
            open_handles: self.cache.open_handles,
            remote: RemoteConfig {
                connect_timeout: self.remote.connect_timeout,
                read_timeout: self.remote.read_timeout,
                block_size: self.remote.block_size,
            },
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            directory: self.logging.directory.clone(),
            file: self.logging.file.clone(),
            level: self.logging.level.clone(),
            rotation: self.logging.rotation,
        }
    }

    /// PostGIS settings, when a database URL is configured.
    #[cfg(feature = "postgis")]
    pub fn postgis_config(&self) -> Option<crate::catalog::PostgisConfig> {
        let catalog = &self.catalog;
        catalog.database_url.as_ref().map(|url| {
            crate::catalog::PostgisConfig::new(url.clone())
                .with_table(catalog.table.clone())
                .with_max_connections(catalog.max_connections)
                .with_acquire_timeout(catalog.connect_timeout)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_components() {
        let config = ConfigFile::default();
        assert_eq!(config.render_config(), RenderConfig::default());
        assert_eq!(config.reader_config(), ReaderConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.socket_addr().port(), 8080);
        assert_eq!(config.logging_config(), LoggingConfig::default());
    }

    #[test]
    fn test_single_attempt_disables_retry() {
        let mut config = ConfigFile::default();
        config.retry.max_attempts = 1;
        assert_eq!(config.retry_policy(), RetryPolicy::None);
    }

    #[test]
    fn test_max_delay_never_below_initial() {
        let mut config = ConfigFile::default();
        config.retry.initial_delay_ms = 500;
        config.retry.max_delay_ms = 100;
        match config.retry_policy() {
            RetryPolicy::ExponentialBackoff { max_delay, .. } => {
                assert_eq!(max_delay, Duration::from_millis(500))
            }
            other => panic!("unexpected policy {other:?}"),
        }
    }

    #[cfg(feature = "postgis")]
    #[test]
    fn test_postgis_config_only_with_url() {
        let mut config = ConfigFile::default();
        assert!(config.postgis_config().is_none());

        config.catalog.database_url = Some("postgres://localhost/dem".to_string());
        config.catalog.table = "dem_sources".to_string();
        let pg = config.postgis_config().unwrap();
        assert_eq!(pg.table, "dem_sources");
        assert_eq!(pg.max_connections, DEFAULT_MAX_CONNECTIONS);
    }
}
