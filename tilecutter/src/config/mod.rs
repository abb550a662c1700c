//! Process configuration from `~/.tilecutter/config.ini`.
//!
//! ```text
//! defaults ─► config.ini ─► PORT / DATABASE_URL / TILECUTTER_CATALOG ─► CLI flags
//! ```
//!
//! Each layer overrides the one before it. [`ConfigFile`] converts into the
//! component configs ([`RenderConfig`](crate::render::RenderConfig),
//! [`ReaderConfig`](crate::raster::ReaderConfig) and so on).

mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use file::{
    config_directory, config_file_path, ConfigFileError, ENV_CATALOG_FILE, ENV_DATABASE_URL,
    ENV_PORT,
};
pub use settings::{
    CacheSettings, CatalogSettings, ConfigFile, LoggingSettings, RemoteSettings, RenderSettings,
    RetrySettings, ServerSettings, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT,
    DEFAULT_REFRESH_INTERVAL,
};
pub use size::{format_size, parse_size, SizeParseError};
