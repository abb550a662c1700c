//! Request-level render errors.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::coord::CoordError;
use crate::encode::EncodeError;

/// Why a tile request produced no image.
///
/// Per-source failures never appear here; the orchestrator logs and skips
/// them.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Malformed coordinate, out-of-range tile, unknown format or bad band
    /// list. Rejected before any pipeline work.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("render timed out after {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("render cancelled")]
    Cancelled,

    /// No source produced a pixel and at least one failed.
    #[error("no source covered the tile ({failed} failed)")]
    NoCoverage { failed: usize },

    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CoordError> for RenderError {
    fn from(e: CoordError) -> Self {
        RenderError::InvalidRequest(e.to_string())
    }
}

/// Only an unreachable catalog is worth retrying; a bad descriptor or
/// footprint fails the same way every time.
impl From<CatalogError> for RenderError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Unavailable(_) | CatalogError::Io(_) => {
                RenderError::CatalogUnavailable(e.to_string())
            }
            CatalogError::Invalid { .. }
            | CatalogError::Parse(_)
            | CatalogError::Projection(_) => RenderError::Internal(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for RenderError {
    fn from(e: tokio::task::JoinError) -> Self {
        RenderError::Internal(format!("render task failed: {e}"))
    }
}
