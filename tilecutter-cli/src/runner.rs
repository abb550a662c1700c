//! CLI runner for common setup.
//!
//! Loads the config, applies environment and flag overrides, starts
//! logging and owns the Tokio runtime the commands run on.

use std::future::Future;
use std::path::Path;

use tilecutter::config::ConfigFile;
use tilecutter::logging::{init_logging, LoggingGuard};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;

pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _logging_guard: LoggingGuard,
}

impl CliRunner {
    /// Loads `config_path` (or the default path), then applies the
    /// environment and finally `overrides`.
    pub fn new<F>(config_path: Option<&Path>, verbose: bool, overrides: F) -> Result<Self, CliError>
    where
        F: FnOnce(&mut ConfigFile),
    {
        let mut config = match config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };
        config.apply_env_overrides()?;
        overrides(&mut config);

        let mut logging = config.logging_config();
        if verbose {
            logging.level = "debug".to_string();
        }
        let logging_guard = init_logging(&logging)?;
        info!(version = tilecutter::VERSION, "tilecutter starting");

        let runtime = Runtime::new().map_err(CliError::Runtime)?;
        Ok(Self {
            config,
            runtime,
            _logging_guard: logging_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        self.runtime.block_on(future)
    }
}

/// Cancels `token` on Ctrl-C.
pub fn cancel_on_ctrlc(token: CancellationToken) {
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Interrupt received, shutting down");
        token.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }
}
