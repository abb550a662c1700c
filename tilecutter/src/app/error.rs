//! Application error types.

use std::fmt;
use std::net::SocketAddr;

use crate::catalog::CatalogError;
use crate::config::ConfigFileError;

/// Errors raised while wiring or running the server.
#[derive(Debug)]
pub enum AppError {
    /// Neither a database URL nor a catalog file is configured.
    NoCatalog,

    /// The catalog could not be built or loaded.
    Catalog(CatalogError),

    /// Configuration could not be read.
    Config(ConfigFileError),

    /// The listening socket could not be bound.
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    Serve(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NoCatalog => write!(
                f,
                "No catalog configured: set catalog.database_url, catalog.file, \
                 DATABASE_URL or TILECUTTER_CATALOG"
            ),
            AppError::Catalog(e) => write!(f, "Catalog error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Bind { addr, source } => {
                write!(f, "Failed to bind {}: {}", addr, source)
            }
            AppError::Serve(e) => write!(f, "Server error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::NoCatalog => None,
            AppError::Catalog(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Bind { source, .. } => Some(source),
            AppError::Serve(e) => Some(e),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(e: CatalogError) -> Self {
        AppError::Catalog(e)
    }
}

impl From<ConfigFileError> for AppError {
    fn from(e: ConfigFileError) -> Self {
        AppError::Config(e)
    }
}
