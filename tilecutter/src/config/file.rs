//! Loading and saving `~/.tilecutter/config.ini`.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::settings::ConfigFile;

/// Environment variable for the listening port.
pub const ENV_PORT: &str = "PORT";

/// Environment variable for the PostGIS connection string.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Environment variable for a JSON catalog file.
pub const ENV_CATALOG_FILE: &str = "TILECUTTER_CATALOG";

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] ini::Error),

    #[error("invalid configuration: {section}.{key} = '{value}' ({reason})")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigFile {
    /// Loads the default path, falling back to defaults when it is missing.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Loads `path`, or returns defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Parses INI text directly.
    pub fn parse_str(text: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(text).map_err(ini::Error::Parse)?;
        super::parser::parse_ini(&ini)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())?;
        Ok(())
    }

    /// Renders the annotated INI form of this config.
    pub fn to_config_string(&self) -> String {
        super::writer::to_config_string(self)
    }

    /// Applies `PORT`, `DATABASE_URL` and `TILECUTTER_CATALOG` from the
    /// process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigFileError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigFileError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(port) = get(ENV_PORT) {
            self.server.port = port.trim().parse().map_err(|_| ConfigFileError::InvalidValue {
                section: "env".to_string(),
                key: ENV_PORT.to_string(),
                value: port.clone(),
                reason: "must be a port number".to_string(),
            })?;
        }
        if let Some(url) = get(ENV_DATABASE_URL) {
            self.catalog.database_url = Some(url);
        }
        if let Some(file) = get(ENV_CATALOG_FILE) {
            self.catalog.file = Some(PathBuf::from(file));
        }
        Ok(())
    }
}

/// `~/.tilecutter`, or `.tilecutter` without a home directory.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tilecutter")
}

pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.server.port = 9100;
        config.catalog.file = Some(PathBuf::from("/srv/dem/catalog.json"));
        config.cache.read_cache_size = 64 * 1024 * 1024;
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 9100);
        assert_eq!(loaded.catalog.file, config.catalog.file);
        assert_eq!(loaded.cache.read_cache_size, 64 * 1024 * 1024);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ConfigFile::default();
        config
            .apply_overrides_from(env(&[
                ("PORT", "9000"),
                ("DATABASE_URL", "postgres://db/dem"),
                ("TILECUTTER_CATALOG", "/tmp/catalog.json"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.catalog.database_url.as_deref(), Some("postgres://db/dem"));
        assert_eq!(config.catalog.file, Some(PathBuf::from("/tmp/catalog.json")));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = ConfigFile::default();
        config.apply_overrides_from(env(&[("PORT", " "), ("DATABASE_URL", "")])).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_bad_port_env() {
        let mut config = ConfigFile::default();
        let err = config
            .apply_overrides_from(env(&[("PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidValue { ref key, .. } if key == "PORT"));
    }

    #[test]
    fn test_config_path() {
        assert!(config_file_path().ends_with(".tilecutter/config.ini"));
    }
}
