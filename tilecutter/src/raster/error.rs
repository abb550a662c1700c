//! Raster source errors.

use std::io;

use thiserror::Error;

use crate::coord::ProjectionError;

/// Failure reading one source raster.
///
/// Only [`SourceError::Unavailable`] is worth retrying; every other variant
/// describes something a second attempt would hit again.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// I/O, network or HTTP status failure.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Malformed TIFF, missing georeferencing or an unsupported layout.
    #[error("corrupt source: {0}")]
    Corrupt(String),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("window of {pixels} pixels exceeds the {limit} pixel limit")]
    WindowTooLarge { pixels: u64, limit: u64 },

    #[error("band {band} requested but source has {available} bands")]
    IncompatibleBands { band: usize, available: usize },

    #[error("read cancelled")]
    Cancelled,
}

impl SourceError {
    /// True when a later attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

impl From<tiff::TiffError> for SourceError {
    fn from(e: tiff::TiffError) -> Self {
        match e {
            tiff::TiffError::IoError(io) => SourceError::from(io),
            other => SourceError::Corrupt(other.to_string()),
        }
    }
}

impl From<io::Error> for SourceError {
    /// Short reads and undecodable bytes come from the data itself and
    /// recur on every attempt; everything else is transport.
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                SourceError::Corrupt(e.to_string())
            }
            _ => SourceError::Unavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(SourceError::Unavailable("timeout".into()).is_retryable());
        assert!(!SourceError::Corrupt("bad magic".into()).is_retryable());
        assert!(!SourceError::Cancelled.is_retryable());
        assert!(!SourceError::WindowTooLarge { pixels: 10, limit: 5 }.is_retryable());
    }

    #[test]
    fn test_tiff_io_error_maps_to_unavailable() {
        let io = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            SourceError::from(tiff::TiffError::IoError(io)),
            SourceError::Unavailable(_)
        ));
        assert!(matches!(
            SourceError::from(tiff::TiffError::LimitsExceeded),
            SourceError::Corrupt(_)
        ));
    }

    #[test]
    fn test_short_read_is_corrupt() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "failed to fill whole buffer");
        let err = SourceError::from(tiff::TiffError::IoError(eof));
        assert!(matches!(err, SourceError::Corrupt(_)), "{err}");
        assert!(!err.is_retryable());

        let garbage = io::Error::new(io::ErrorKind::InvalidData, "bad deflate stream");
        assert!(matches!(SourceError::from(garbage), SourceError::Corrupt(_)));

        for kind in [io::ErrorKind::NotFound, io::ErrorKind::TimedOut, io::ErrorKind::Other] {
            assert!(SourceError::from(io::Error::new(kind, "x")).is_retryable());
        }
    }
}
