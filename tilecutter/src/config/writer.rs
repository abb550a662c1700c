//! Annotated INI rendering of [`ConfigFile`], used by `tilecutter init`.

use std::path::Path;
use std::time::Duration;

use super::settings::ConfigFile;
use super::size::format_size;

pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let database_url = config.catalog.database_url.as_deref().unwrap_or("");
    let catalog_file = config
        .catalog
        .file
        .as_deref()
        .map(path_to_string)
        .unwrap_or_default();
    let min_coverage = config
        .render
        .min_coverage
        .map(|v| v.to_string())
        .unwrap_or_default();

    format!(
        r#"[server]
; Address and port to listen on. PORT in the environment overrides port.
bind = {bind}
port = {port}

[catalog]
; PostGIS connection string (DATABASE_URL overrides). Takes precedence
; over file when both are set.
database_url = {database_url}
; JSON catalog file (TILECUTTER_CATALOG overrides)
file = {catalog_file}
; Footprint table queried in PostGIS
table = {table}
; Seconds between catalog reloads
refresh_interval = {refresh_interval}
max_connections = {max_connections}
; Seconds to wait for a pooled database connection
connect_timeout = {catalog_connect_timeout}

[render]
; Tile edge in pixels
tile_size = {tile_size}
; nearest, bilinear or cubic. Categorical sources always use nearest.
resampling = {resampling}
; Fraction of kernel weight that must be valid for an output pixel.
; Leave empty to use the kernel default.
min_coverage = {min_coverage}
; Seconds before a render fails with a timeout
timeout = {timeout}
; Candidates read per tile, in priority order
max_sources = {max_sources}
; Source windows read concurrently per tile
source_concurrency = {source_concurrency}
max_concurrent_renders = {max_concurrent_renders}
; Largest source window read for one tile, in pixels
max_window_pixels = {max_window_pixels}
; Fail instead of returning an empty tile when sources failed
require_coverage = {require_coverage}

[cache]
; Memory for decoded source blocks (e.g. 512MB, 2GB)
read_cache_size = {read_cache_size}
; Source files kept open
open_handles = {open_handles}

[retry]
; Attempts per source read, including the first. 1 disables retries.
max_attempts = {max_attempts}
initial_delay_ms = {initial_delay_ms}
max_delay_ms = {max_delay_ms}

[remote]
; Seconds; applies to HTTP(S) and S3 sources
connect_timeout = {remote_connect_timeout}
read_timeout = {read_timeout}
; Bytes per range request
block_size = {block_size}

[logging]
directory = {log_directory}
file = {log_file}
; Default filter; RUST_LOG overrides
level = {log_level}
; daily or never
rotation = {rotation}
"#,
        bind = config.server.bind,
        port = config.server.port,
        table = config.catalog.table,
        refresh_interval = secs(config.catalog.refresh_interval),
        max_connections = config.catalog.max_connections,
        catalog_connect_timeout = secs(config.catalog.connect_timeout),
        tile_size = config.render.tile_size,
        resampling = config.render.resampling,
        timeout = secs(config.render.timeout),
        max_sources = config.render.max_sources,
        source_concurrency = config.render.source_concurrency,
        max_concurrent_renders = config.render.max_concurrent_renders,
        max_window_pixels = config.render.max_window_pixels,
        require_coverage = config.render.require_coverage,
        read_cache_size = format_size(config.cache.read_cache_size),
        open_handles = config.cache.open_handles,
        max_attempts = config.retry.max_attempts,
        initial_delay_ms = config.retry.initial_delay_ms,
        max_delay_ms = config.retry.max_delay_ms,
        remote_connect_timeout = secs(config.remote.connect_timeout),
        read_timeout = secs(config.remote.read_timeout),
        block_size = format_size(config.remote.block_size as u64),
        log_directory = path_to_string(&config.logging.directory),
        log_file = config.logging.file,
        log_level = config.logging.level,
        rotation = config.logging.rotation,
    )
}

/// Whole seconds, rounded up so sub-second values never become zero.
fn secs(duration: Duration) -> u64 {
    let whole = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        whole + 1
    } else {
        whole
    }
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
