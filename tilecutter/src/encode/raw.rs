//! Headerless float output.

use super::{DecodedTile, EncodeError, TileEncoder};
use crate::render::CompositeTile;

/// Upper bound on bands in one raw tile.
pub const MAX_RAW_BANDS: usize = 16;

/// Little-endian `f32` samples, row-major and band-interleaved, NaN for
/// nodata. Clients must know the tile size and band count.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEncoder;

impl TileEncoder for RawEncoder {
    fn encode(&self, tile: &CompositeTile) -> Result<Vec<u8>, EncodeError> {
        if !self.supports_bands(tile.bands) {
            return Err(EncodeError::UnsupportedBands {
                format: self.name(),
                bands: tile.bands,
            });
        }
        let data = tile.cropped_data();
        let mut out = Vec::with_capacity(data.len() * 4);
        for value in data {
            out.extend_from_slice(&value.to_le_bytes());
        }
        Ok(out)
    }

    fn content_type(&self) -> &'static str {
        "application/octet-stream"
    }

    fn extension(&self) -> &'static str {
        "bin"
    }

    fn name(&self) -> &'static str {
        "raw float32"
    }

    fn max_bands(&self) -> usize {
        MAX_RAW_BANDS
    }
}

/// Decodes a raw tile of known geometry.
pub fn decode_raw(
    bytes: &[u8],
    width: u32,
    height: u32,
    bands: usize,
) -> Result<DecodedTile, EncodeError> {
    let expected = width as usize * height as usize * bands * 4;
    if bytes.len() != expected {
        return Err(EncodeError::Decode(format!(
            "expected {expected} bytes for {width}x{height}x{bands}, got {}",
            bytes.len()
        )));
    }
    let data = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(DecodedTile {
        width,
        height,
        bands,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::test_support::composite;

    #[test]
    fn test_round_trip_preserves_nodata() {
        let values = [1.5, f32::NAN, -3.25, 1.0e6];
        let bytes = RawEncoder.encode(&composite(2, 2, &values)).unwrap();
        assert_eq!(bytes.len(), 16);

        let decoded = decode_raw(&bytes, 2, 2, 1).unwrap();
        assert_eq!(decoded.value(0, 0, 0), 1.5);
        assert!(decoded.value(1, 0, 0).is_nan());
        assert_eq!(decoded.value(0, 1, 0), -3.25);
        assert_eq!(decoded.nodata_count(), 1);
    }

    #[test]
    fn test_little_endian_layout() {
        let bytes = RawEncoder.encode(&composite(1, 1, &[1.0])).unwrap();
        assert_eq!(bytes, 1.0f32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(decode_raw(&[0u8; 15], 2, 2, 1).is_err());
    }
}
