//! Shaded relief rendered from the elevation composite.

use image::ExtendedColorType;

use super::terrain::write_png;
use super::{EncodeError, TileEncoder};
use crate::coord::{mercator_to_wgs84, resolution_in_meters};
use crate::render::CompositeTile;

/// Default light direction, degrees clockwise from north.
pub const DEFAULT_AZIMUTH: f64 = 315.0;

/// Default light elevation above the horizon in degrees.
pub const DEFAULT_ALTITUDE: f64 = 45.0;

/// Grey + alpha PNG hillshade using Horn's slope estimate.
///
/// Needs one pixel of context on every side, so the orchestrator renders
/// the composite with a one-pixel buffer. Where the buffer was clamped at
/// the edge of the world, or a neighbour is nodata, the centre value
/// stands in for the missing neighbour.
#[derive(Debug, Clone, Copy)]
pub struct HillshadeEncoder {
    azimuth: f64,
    altitude: f64,
    z_factor: f64,
}

impl Default for HillshadeEncoder {
    fn default() -> Self {
        Self {
            azimuth: DEFAULT_AZIMUTH,
            altitude: DEFAULT_ALTITUDE,
            z_factor: 1.0,
        }
    }
}

impl HillshadeEncoder {
    pub fn with_azimuth(mut self, degrees: f64) -> Self {
        self.azimuth = degrees;
        self
    }

    pub fn with_altitude(mut self, degrees: f64) -> Self {
        self.altitude = degrees;
        self
    }

    /// Vertical exaggeration applied to elevations.
    pub fn with_z_factor(mut self, z_factor: f64) -> Self {
        self.z_factor = z_factor;
        self
    }

    /// Shade in `[0, 1]` for the 3×3 neighbourhood `z` (row-major).
    fn shade(&self, z: &[f64; 9], res_x: f64, res_y: f64) -> f64 {
        let [a, b, c, d, _, f, g, h, i] = *z;
        let dzdx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / (8.0 * res_x) * self.z_factor;
        let dzdy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / (8.0 * res_y) * self.z_factor;

        let slope = dzdx.hypot(dzdy).atan();
        let aspect = dzdy.atan2(-dzdx);
        let zenith = (90.0 - self.altitude).to_radians();
        let azimuth = (360.0 - self.azimuth + 90.0).rem_euclid(360.0).to_radians();

        let shade = zenith.cos() * slope.cos()
            + zenith.sin() * slope.sin() * (azimuth - aspect).cos();
        shade.clamp(0.0, 1.0)
    }

    /// Ground pixel size in meters at the tile centre.
    fn ground_resolution(tile: &CompositeTile) -> (f64, f64) {
        let grid = &tile.grid;
        let (res_x, res_y) = resolution_in_meters(&grid.bbox, grid.width, grid.height);
        if grid.srs().is_web_mercator() {
            let (_, lat) = mercator_to_wgs84(grid.bbox.center().0, grid.bbox.center().1);
            let scale = lat.to_radians().cos();
            (res_x * scale, res_y * scale)
        } else {
            (res_x, res_y)
        }
    }
}

impl TileEncoder for HillshadeEncoder {
    fn encode(&self, tile: &CompositeTile) -> Result<Vec<u8>, EncodeError> {
        if tile.bands != 1 {
            return Err(EncodeError::UnsupportedBands {
                format: self.name(),
                bands: tile.bands,
            });
        }
        let (res_x, res_y) = Self::ground_resolution(tile);
        let (width, height) = tile.cropped_size();
        let (full_w, full_h) = (tile.width() as i64, tile.height() as i64);

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 2);
        tile.for_each_cropped(|col, row, values, valid| {
            if !valid {
                pixels.extend_from_slice(&[0, 0]);
                return;
            }
            let centre = f64::from(values[0]);
            let (cx, cy) = (
                i64::from(col + tile.crop.left),
                i64::from(row + tile.crop.top),
            );
            let mut z = [centre; 9];
            for (k, slot) in z.iter_mut().enumerate() {
                let (nx, ny) = (cx + k as i64 % 3 - 1, cy + k as i64 / 3 - 1);
                if nx < 0 || ny < 0 || nx >= full_w || ny >= full_h {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                if tile.is_valid(nx, ny) {
                    *slot = f64::from(tile.pixel(nx, ny)[0]);
                }
            }
            let grey = (self.shade(&z, res_x, res_y) * 255.0).round() as u8;
            pixels.extend_from_slice(&[grey, 255]);
        });
        write_png(&pixels, width, height, ExtendedColorType::La8)
    }

    fn content_type(&self) -> &'static str {
        "image/png"
    }

    fn extension(&self) -> &'static str {
        "hillshade.png"
    }

    fn name(&self) -> &'static str {
        "hillshade PNG"
    }

    fn buffer(&self) -> u32 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::test_support::composite;

    fn decode(bytes: &[u8]) -> image::GrayAlphaImage {
        image::load_from_memory(bytes).unwrap().to_luma_alpha8()
    }

    #[test]
    fn test_flat_terrain_is_lit_by_altitude() {
        let bytes = HillshadeEncoder::default()
            .encode(&composite(3, 3, &[100.0; 9]))
            .unwrap();
        let image = decode(&bytes);
        // cos(45°) · 255
        for pixel in image.pixels() {
            assert_eq!(pixel.0, [180, 255]);
        }
    }

    #[test]
    fn test_nodata_is_transparent() {
        let mut values = [100.0; 9];
        values[4] = f32::NAN;
        let bytes = HillshadeEncoder::default()
            .encode(&composite(3, 3, &values))
            .unwrap();
        let image = decode(&bytes);
        assert_eq!(image.get_pixel(1, 1).0[1], 0);
        assert_eq!(image.get_pixel(0, 0).0, [180, 255]);
    }

    #[test]
    fn test_slope_facing_light_is_brighter() {
        // Rises to the south-east, so it faces the north-west light.
        let facing: Vec<f32> = (0..9).map(|i| ((i % 3) + (i / 3)) as f32 * 5.0).collect();
        let away: Vec<f32> = facing.iter().map(|v| -v).collect();
        let encoder = HillshadeEncoder::default();
        let lit = decode(&encoder.encode(&composite(3, 3, &facing)).unwrap());
        let dark = decode(&encoder.encode(&composite(3, 3, &away)).unwrap());
        assert!(lit.get_pixel(1, 1).0[0] > 180);
        assert!(dark.get_pixel(1, 1).0[0] < 180);
    }

    #[test]
    fn test_shade_is_bounded() {
        let encoder = HillshadeEncoder::default();
        let cliff = [0.0, 0.0, 0.0, 0.0, 0.0, 1.0e6, 1.0e6, 1.0e6, 1.0e6];
        let shade = encoder.shade(&cliff, 1.0, 1.0);
        assert!((0.0..=1.0).contains(&shade));
    }
}
