//! Maps INI sections and keys onto [`ConfigFile`].
//!
//! Parsing starts from the defaults and overlays whatever the file sets.
//! Unknown keys are ignored; empty values leave the default in place.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(s) = ini.section(Some("server")) {
        let s = Section::new("server", s);
        if let Some(v) = s.parsed("bind", "must be an IP address")? {
            config.server.bind = v;
        }
        if let Some(v) = s.parsed("port", "must be a port number")? {
            config.server.port = v;
        }
    }

    if let Some(s) = ini.section(Some("catalog")) {
        let s = Section::new("catalog", s);
        if let Some(v) = s.get("database_url") {
            config.catalog.database_url = Some(v.to_string());
        }
        if let Some(v) = s.get("file") {
            config.catalog.file = Some(expand_tilde(v));
        }
        if let Some(v) = s.get("table") {
            config.catalog.table = v.to_string();
        }
        if let Some(v) = s.seconds("refresh_interval")? {
            config.catalog.refresh_interval = v;
        }
        if let Some(v) = s.positive("max_connections")? {
            config.catalog.max_connections = v;
        }
        if let Some(v) = s.seconds("connect_timeout")? {
            config.catalog.connect_timeout = v;
        }
    }

    if let Some(s) = ini.section(Some("render")) {
        let s = Section::new("render", s);
        if let Some(v) = s.positive::<u32>("tile_size")? {
            if v > 4096 {
                return Err(s.invalid("tile_size", "must be at most 4096"));
            }
            config.render.tile_size = v;
        }
        if let Some(v) = s.parsed("resampling", "must be nearest, bilinear or cubic")? {
            config.render.resampling = v;
        }
        if let Some(v) = s.parsed::<f64>("min_coverage", "must be a number")? {
            if !(v > 0.0 && v <= 1.0) {
                return Err(s.invalid("min_coverage", "must be in (0, 1]"));
            }
            config.render.min_coverage = Some(v);
        }
        if let Some(v) = s.seconds("timeout")? {
            config.render.timeout = v;
        }
        if let Some(v) = s.positive("max_sources")? {
            config.render.max_sources = v;
        }
        if let Some(v) = s.positive("source_concurrency")? {
            config.render.source_concurrency = v;
        }
        if let Some(v) = s.positive("max_concurrent_renders")? {
            config.render.max_concurrent_renders = v;
        }
        if let Some(v) = s.positive("max_window_pixels")? {
            config.render.max_window_pixels = v;
        }
        if let Some(v) = s.parsed("require_coverage", "must be true or false")? {
            config.render.require_coverage = v;
        }
    }

    if let Some(s) = ini.section(Some("cache")) {
        let s = Section::new("cache", s);
        if let Some(v) = s.size("read_cache_size")? {
            config.cache.read_cache_size = v;
        }
        if let Some(v) = s.positive("open_handles")? {
            config.cache.open_handles = v;
        }
    }

    if let Some(s) = ini.section(Some("retry")) {
        let s = Section::new("retry", s);
        if let Some(v) = s.positive("max_attempts")? {
            config.retry.max_attempts = v;
        }
        if let Some(v) = s.parsed("initial_delay_ms", "must be milliseconds")? {
            config.retry.initial_delay_ms = v;
        }
        if let Some(v) = s.parsed("max_delay_ms", "must be milliseconds")? {
            config.retry.max_delay_ms = v;
        }
    }

    if let Some(s) = ini.section(Some("remote")) {
        let s = Section::new("remote", s);
        if let Some(v) = s.seconds("connect_timeout")? {
            config.remote.connect_timeout = v;
        }
        if let Some(v) = s.seconds("read_timeout")? {
            config.remote.read_timeout = v;
        }
        if let Some(v) = s.size("block_size")? {
            if v == 0 {
                return Err(s.invalid("block_size", "must be greater than zero"));
            }
            config.remote.block_size =
                usize::try_from(v).map_err(|_| s.invalid("block_size", "is too large"))?;
        }
    }

    if let Some(s) = ini.section(Some("logging")) {
        let s = Section::new("logging", s);
        if let Some(v) = s.get("directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = s.get("file") {
            config.logging.file = v.to_string();
        }
        if let Some(v) = s.get("level") {
            config.logging.level = v.to_string();
        }
        if let Some(v) = s.parsed("rotation", "must be daily or never")? {
            config.logging.rotation = v;
        }
    }

    Ok(config)
}

/// One INI section with error context.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    /// Trimmed, non-empty value of `key`.
    fn get(&self, key: &str) -> Option<&'a str> {
        self.props.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    fn invalid(&self, key: &str, reason: impl Display) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: self.get(key).unwrap_or_default().to_string(),
            reason: reason.to_string(),
        }
    }

    fn parsed<T: FromStr>(&self, key: &str, reason: &str) -> Result<Option<T>, ConfigFileError> {
        self.get(key)
            .map(|v| v.parse::<T>().map_err(|_| self.invalid(key, reason)))
            .transpose()
    }

    fn positive<T>(&self, key: &str) -> Result<Option<T>, ConfigFileError>
    where
        T: FromStr + PartialOrd + Default,
    {
        match self.parsed::<T>(key, "must be a positive integer")? {
            Some(v) if v <= T::default() => Err(self.invalid(key, "must be greater than zero")),
            other => Ok(other),
        }
    }

    fn seconds(&self, key: &str) -> Result<Option<Duration>, ConfigFileError> {
        match self.parsed::<u64>(key, "must be a whole number of seconds")? {
            Some(0) => Err(self.invalid(key, "must be greater than zero")),
            other => Ok(other.map(Duration::from_secs)),
        }
    }

    fn size(&self, key: &str) -> Result<Option<u64>, ConfigFileError> {
        self.get(key)
            .map(|v| parse_size(v).map_err(|e| self.invalid(key, e)))
            .transpose()
    }
}

/// Expands a leading `~` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}
