//! `tilecutter init`: write the annotated default config file.

use std::path::{Path, PathBuf};

use clap::Args;
use tilecutter::config::{config_file_path, ConfigFile};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

/// Writes the defaults to `path` (or the default path).
pub fn run(path: Option<&Path>, args: InitArgs) -> Result<(), CliError> {
    let path: PathBuf = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
    write_default_config(&path, args.force)?;

    println!("Configuration file: {}", path.display());
    println!();
    println!("Set catalog.file or catalog.database_url, then run `tilecutter serve`.");
    println!("Environment variables and CLI arguments override file values.");
    Ok(())
}

fn write_default_config(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::ConfigExists(path.to_path_buf()));
    }
    ConfigFile::default().save_to(path)?;
    Ok(())
}
