//! Error types for tile encoding.

use thiserror::Error;

/// Errors from encoding or decoding a tile.
///
/// Encoding a well-formed composite never fails; these surface only for
/// band counts an encoder was never asked to accept, library failures, or
/// malformed input handed to a decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{format} cannot encode {bands} bands")]
    UnsupportedBands { format: &'static str, bands: usize },

    #[error("PNG encoding failed: {0}")]
    Png(String),

    #[error("TIFF encoding failed: {0}")]
    Tiff(String),

    #[error("cannot decode tile: {0}")]
    Decode(String),
}

impl From<image::ImageError> for EncodeError {
    fn from(e: image::ImageError) -> Self {
        EncodeError::Png(e.to_string())
    }
}

impl From<tiff::TiffError> for EncodeError {
    fn from(e: tiff::TiffError) -> Self {
        EncodeError::Tiff(e.to_string())
    }
}
