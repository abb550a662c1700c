//! CLI error handling with user-friendly messages.
//!
//! Every failure maps to an exit code so scripts can tell bad input from
//! an unavailable catalog or a failed render.

use std::fmt;
use std::path::PathBuf;
use std::process;

use tilecutter::app::AppError;
use tilecutter::config::ConfigFileError;
use tilecutter::logging::LoggingError;
use tilecutter::render::RenderError;

/// Exit code for a failure with no more specific code.
pub const EXIT_FAILURE: i32 = 1;
/// Bad arguments or configuration.
pub const EXIT_USAGE: i32 = 2;
/// The catalog could not be reached or loaded.
pub const EXIT_CATALOG: i32 = 3;
/// The tile could not be rendered.
pub const EXIT_RENDER: i32 = 4;
/// Interrupted by Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug)]
pub enum CliError {
    Config(ConfigFileError),
    LoggingInit(LoggingError),
    App(AppError),
    Render(RenderError),
    InvalidArgument(String),
    ConfigExists(PathBuf),
    FileWrite { path: PathBuf, error: std::io::Error },
    Runtime(std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::InvalidArgument(_) | CliError::ConfigExists(_) => {
                EXIT_USAGE
            }
            CliError::App(AppError::NoCatalog | AppError::Config(_)) => EXIT_USAGE,
            CliError::App(AppError::Catalog(_)) => EXIT_CATALOG,
            CliError::Render(RenderError::InvalidRequest(_)) => EXIT_USAGE,
            CliError::Render(RenderError::CatalogUnavailable(_)) => EXIT_CATALOG,
            CliError::Render(RenderError::Cancelled) => EXIT_INTERRUPTED,
            CliError::Render(_) => EXIT_RENDER,
            _ => EXIT_FAILURE,
        }
    }

    /// Prints the error with any hints and exits.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::App(AppError::NoCatalog) => {
                eprintln!();
                eprintln!("Point tilecutter at a catalog with one of:");
                eprintln!("  --catalog-file catalog.json");
                eprintln!("  --database-url postgres://user@host/db");
                eprintln!("  catalog.file or catalog.database_url in config.ini");
            }
            CliError::ConfigExists(_) => {
                eprintln!("Use --force to overwrite it.");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "{}", e),
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::App(e) => write!(f, "{}", e),
            CliError::Render(e) => write!(f, "Render failed: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "{}", msg),
            CliError::ConfigExists(path) => {
                write!(f, "Config file already exists: {}", path.display())
            }
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::LoggingInit(e) => Some(e),
            CliError::App(e) => Some(e),
            CliError::Render(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::Runtime(e) => Some(e),
            CliError::InvalidArgument(_) | CliError::ConfigExists(_) => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::LoggingInit(e)
    }
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        CliError::App(e)
    }
}

impl From<RenderError> for CliError {
    fn from(e: RenderError) -> Self {
        CliError::Render(e)
    }
}
