//! Arguments shared across commands.

use std::path::PathBuf;

use clap::Args;
use tilecutter::config::ConfigFile;

/// Catalog selection. Each flag replaces the other backend so the choice
/// made on the command line always wins.
#[derive(Debug, Clone, Default, Args)]
pub struct CatalogArgs {
    /// PostGIS connection string
    #[arg(long, conflicts_with = "catalog_file")]
    pub database_url: Option<String>,

    /// JSON catalog file
    #[arg(long)]
    pub catalog_file: Option<PathBuf>,
}

impl CatalogArgs {
    pub fn apply(&self, config: &mut ConfigFile) {
        if let Some(url) = &self.database_url {
            config.catalog.database_url = Some(url.clone());
            config.catalog.file = None;
        }
        if let Some(file) = &self.catalog_file {
            config.catalog.file = Some(file.clone());
            config.catalog.database_url = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_file_replaces_database() {
        let mut config = ConfigFile::default();
        config.catalog.database_url = Some("postgres://db/dem".to_string());

        let args = CatalogArgs {
            database_url: None,
            catalog_file: Some(PathBuf::from("catalog.json")),
        };
        args.apply(&mut config);
        assert_eq!(config.catalog.database_url, None);
        assert_eq!(config.catalog.file, Some(PathBuf::from("catalog.json")));
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut config = ConfigFile::default();
        config.catalog.file = Some(PathBuf::from("from-config.json"));
        CatalogArgs::default().apply(&mut config);
        assert_eq!(config.catalog.file, Some(PathBuf::from("from-config.json")));
    }
}
