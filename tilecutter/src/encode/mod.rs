//! Tile output formats.
//!
//! Every format implements [`TileEncoder`], so the orchestrator and the
//! HTTP layer only ever see `Arc<dyn TileEncoder>` chosen by extension:
//!
//! ```text
//!   "12/654/1583.rgb.png"
//!              │
//!              ▼
//!   OutputFormat::from_extension("rgb.png") ──► encoder_for(format)
//!                                                     │
//!        ┌──────────────┬─────────────┬───────────────┼──────────────┐
//!        ▼              ▼             ▼               ▼              ▼
//!   Terrarium PNG  Terrain-RGB   Float32 GeoTIFF   raw f32     hillshade PNG
//!      .png          .rgb.png        .tif           .bin      .hillshade.png
//! ```
//!
//! Encoders take a [`CompositeTile`](crate::render::CompositeTile), crop
//! its render buffer and serialize the rest. Nodata becomes a transparent
//! pixel in the PNG formats and NaN in the float formats.

mod error;
mod geotiff;
mod hillshade;
mod raw;
mod terrain;

pub use error::EncodeError;
pub use geotiff::GeoTiffEncoder;
pub use hillshade::{HillshadeEncoder, DEFAULT_ALTITUDE, DEFAULT_AZIMUTH};
pub use raw::{decode_raw, RawEncoder, MAX_RAW_BANDS};
pub use terrain::{decode_terrain_rgb, decode_terrarium, TerrainRgbEncoder, TerrariumEncoder};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::render::CompositeTile;

/// Serializes a composite into one output format.
pub trait TileEncoder: Send + Sync {
    /// Encodes the cropped tile.
    fn encode(&self, tile: &CompositeTile) -> Result<Vec<u8>, EncodeError>;

    /// MIME type for the HTTP response.
    fn content_type(&self) -> &'static str;

    /// File extension without the leading dot.
    fn extension(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Pixels needed around the tile for neighbourhood operations.
    fn buffer(&self) -> u32 {
        0
    }

    fn max_bands(&self) -> usize {
        1
    }

    /// True when the encoder accepts a composite with `bands` bands.
    fn supports_bands(&self, bands: usize) -> bool {
        (1..=self.max_bands()).contains(&bands)
    }
}

/// The registered output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Terrarium-encoded elevation PNG.
    Terrarium,
    /// Mapbox Terrain-RGB PNG.
    TerrainRgb,
    /// Float32 GeoTIFF.
    GeoTiff,
    /// Headerless little-endian f32.
    Raw,
    /// Shaded relief PNG.
    Hillshade,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Terrarium,
        OutputFormat::TerrainRgb,
        OutputFormat::GeoTiff,
        OutputFormat::Raw,
        OutputFormat::Hillshade,
    ];

    /// Resolves a tile path extension (`png`, `rgb.png`, ...).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Terrarium),
            "rgb.png" => Some(OutputFormat::TerrainRgb),
            "tif" | "tiff" => Some(OutputFormat::GeoTiff),
            "bin" => Some(OutputFormat::Raw),
            "hillshade.png" => Some(OutputFormat::Hillshade),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Terrarium => "png",
            OutputFormat::TerrainRgb => "rgb.png",
            OutputFormat::GeoTiff => "tif",
            OutputFormat::Raw => "bin",
            OutputFormat::Hillshade => "hillshade.png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::from_extension(s).ok_or_else(|| format!("unknown tile format '{s}'"))
    }
}

/// The encoder registered for `format`.
pub fn encoder_for(format: OutputFormat) -> Arc<dyn TileEncoder> {
    match format {
        OutputFormat::Terrarium => Arc::new(TerrariumEncoder),
        OutputFormat::TerrainRgb => Arc::new(TerrainRgbEncoder),
        OutputFormat::GeoTiff => Arc::new(GeoTiffEncoder),
        OutputFormat::Raw => Arc::new(RawEncoder),
        OutputFormat::Hillshade => Arc::new(HillshadeEncoder::default()),
    }
}

/// A decoded tile: band-interleaved samples with NaN for nodata.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTile {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub data: Vec<f32>,
}

impl DecodedTile {
    pub fn value(&self, col: u32, row: u32, band: usize) -> f32 {
        self.data[(row as usize * self.width as usize + col as usize) * self.bands + band]
    }

    pub fn nodata_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_nan()).count()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::coord::{CropOffsets, GeoBBox, GridSpec, SpatialRef};
    use crate::raster::RasterWindow;
    use crate::render::CompositeTile;

    /// A composite over a 10 m Web Mercator grid filled from `values`;
    /// NaN entries stay nodata.
    pub fn composite(width: u32, height: u32, values: &[f32]) -> CompositeTile {
        let grid = GridSpec::new(
            GeoBBox::new(
                0.0,
                0.0,
                width as f64 * 10.0,
                height as f64 * 10.0,
                SpatialRef::web_mercator(),
            ),
            width,
            height,
        );
        let window = RasterWindow {
            width,
            height,
            bands: 1,
            data: values.to_vec(),
            valid: values.iter().map(|v| !v.is_nan()).collect(),
            srs: grid.bbox.srs.clone(),
            transform: grid.transform(),
        };
        let mut tile = CompositeTile::new(grid, 1, CropOffsets::default());
        tile.merge(&window, &[0], 0).unwrap();
        tile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_registry() {
        for format in OutputFormat::ALL {
            assert_eq!(OutputFormat::from_extension(format.extension()), Some(format));
            assert_eq!(encoder_for(format).extension(), format.extension());
        }
        assert_eq!(OutputFormat::from_extension("TIFF"), Some(OutputFormat::GeoTiff));
        assert_eq!(OutputFormat::from_extension("jpg"), None);
        assert!("webp".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_band_support() {
        assert!(encoder_for(OutputFormat::Terrarium).supports_bands(1));
        assert!(!encoder_for(OutputFormat::Terrarium).supports_bands(2));
        assert!(!encoder_for(OutputFormat::Raw).supports_bands(0));

        let tif = encoder_for(OutputFormat::GeoTiff);
        assert!(tif.supports_bands(3));
        assert!(tif.supports_bands(4));
        assert!(!tif.supports_bands(2));
    }

    #[test]
    fn test_only_hillshade_needs_buffer() {
        for format in OutputFormat::ALL {
            let expected = if format == OutputFormat::Hillshade { 1 } else { 0 };
            assert_eq!(encoder_for(format).buffer(), expected, "{format}");
        }
    }
}
