//! Elevation packed into RGB PNGs.
//!
//! Both formats quantize the elevation to a 24-bit integer spread over the
//! red, green and blue channels:
//!
//! | format      | integer `n`                 | step   |
//! |-------------|-----------------------------|--------|
//! | Terrarium   | `(v + 32768) * 256`         | 1/256 m |
//! | Terrain-RGB | `(v + 10000) * 10`          | 0.1 m  |
//!
//! Nodata is written as a fully transparent pixel.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

use super::{DecodedTile, EncodeError, TileEncoder};
use crate::render::CompositeTile;

const MAX_PACKED: f64 = 0xFF_FFFF as f64;

/// Terrarium PNG (`v + 32768 = R·256 + G + B/256`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TerrariumEncoder;

/// Mapbox Terrain-RGB PNG (`v = -10000 + (R·65536 + G·256 + B)·0.1`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TerrainRgbEncoder;

impl TileEncoder for TerrariumEncoder {
    fn encode(&self, tile: &CompositeTile) -> Result<Vec<u8>, EncodeError> {
        encode_packed(tile, self.name(), |v| (v + 32768.0) * 256.0)
    }

    fn content_type(&self) -> &'static str {
        "image/png"
    }

    fn extension(&self) -> &'static str {
        "png"
    }

    fn name(&self) -> &'static str {
        "Terrarium PNG"
    }
}

impl TileEncoder for TerrainRgbEncoder {
    fn encode(&self, tile: &CompositeTile) -> Result<Vec<u8>, EncodeError> {
        encode_packed(tile, self.name(), |v| (v + 10000.0) * 10.0)
    }

    fn content_type(&self) -> &'static str {
        "image/png"
    }

    fn extension(&self) -> &'static str {
        "rgb.png"
    }

    fn name(&self) -> &'static str {
        "Terrain-RGB PNG"
    }
}

fn encode_packed<F>(
    tile: &CompositeTile,
    name: &'static str,
    pack: F,
) -> Result<Vec<u8>, EncodeError>
where
    F: Fn(f64) -> f64,
{
    if tile.bands != 1 {
        return Err(EncodeError::UnsupportedBands {
            format: name,
            bands: tile.bands,
        });
    }
    let (width, height) = tile.cropped_size();
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    tile.for_each_cropped(|_, _, values, valid| {
        if !valid {
            rgba.extend_from_slice(&[0, 0, 0, 0]);
            return;
        }
        let n = pack(f64::from(values[0])).round().clamp(0.0, MAX_PACKED) as u32;
        rgba.extend_from_slice(&[(n >> 16) as u8, (n >> 8) as u8, n as u8, 255]);
    });
    write_png(&rgba, width, height, ExtendedColorType::Rgba8)
}

/// Writes 8-bit pixels as a PNG.
pub(super) fn write_png(
    pixels: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(pixels, width, height, color)?;
    Ok(out)
}

/// Decodes a Terrarium PNG; transparent pixels become NaN.
pub fn decode_terrarium(bytes: &[u8]) -> Result<DecodedTile, EncodeError> {
    decode_packed(bytes, |n| n / 256.0 - 32768.0)
}

/// Decodes a Terrain-RGB PNG; transparent pixels become NaN.
pub fn decode_terrain_rgb(bytes: &[u8]) -> Result<DecodedTile, EncodeError> {
    decode_packed(bytes, |n| n * 0.1 - 10000.0)
}

fn decode_packed<F>(bytes: &[u8], unpack: F) -> Result<DecodedTile, EncodeError>
where
    F: Fn(f64) -> f64,
{
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| EncodeError::Decode(e.to_string()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let data = image
        .pixels()
        .map(|p| {
            let [r, g, b, a] = p.0;
            if a == 0 {
                return f32::NAN;
            }
            let n = (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
            unpack(f64::from(n)) as f32
        })
        .collect();
    Ok(DecodedTile {
        width,
        height,
        bands: 1,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::test_support::composite;
    use approx::assert_abs_diff_eq;

    const SAMPLES: [f32; 4] = [0.0, -10.5, 8848.25, f32::NAN];

    #[test]
    fn test_terrarium_round_trip_is_exact_on_its_grid() {
        let bytes = TerrariumEncoder.encode(&composite(2, 2, &SAMPLES)).unwrap();
        let decoded = decode_terrarium(&bytes).unwrap();

        assert_eq!((decoded.width, decoded.height), (2, 2));
        assert_eq!(decoded.data[..3], SAMPLES[..3]);
        assert!(decoded.data[3].is_nan());
    }

    #[test]
    fn test_terrarium_channel_layout() {
        // 0 m is 32768 = 128·256
        let bytes = TerrariumEncoder.encode(&composite(1, 1, &[0.0])).unwrap();
        let image = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(0, 0).0, [128, 0, 0, 255]);
    }

    #[test]
    fn test_terrain_rgb_round_trip_within_step() {
        let bytes = TerrainRgbEncoder.encode(&composite(2, 2, &SAMPLES)).unwrap();
        let decoded = decode_terrain_rgb(&bytes).unwrap();

        for (got, want) in decoded.data[..3].iter().zip(&SAMPLES[..3]) {
            assert_abs_diff_eq!(*got, *want, epsilon = 0.05);
        }
        assert!(decoded.data[3].is_nan());
    }

    #[test]
    fn test_terrain_rgb_clamps_out_of_range() {
        let bytes = TerrainRgbEncoder
            .encode(&composite(2, 1, &[-20000.0, 2.0e6]))
            .unwrap();
        let decoded = decode_terrain_rgb(&bytes).unwrap();
        assert_abs_diff_eq!(decoded.data[0], -10000.0, epsilon = 1e-3);
        assert_abs_diff_eq!(decoded.data[1], 1667721.5, epsilon = 0.1);
    }

    #[test]
    fn test_all_nodata_is_transparent() {
        let bytes = TerrariumEncoder
            .encode(&composite(2, 2, &[f32::NAN; 4]))
            .unwrap();
        let decoded = decode_terrarium(&bytes).unwrap();
        assert_eq!(decoded.nodata_count(), 4);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_terrarium(b"not a png"),
            Err(EncodeError::Decode(_))
        ));
    }
}
