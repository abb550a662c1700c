//! Priority compositing of reprojected windows.

use thiserror::Error;

use crate::coord::{CropOffsets, GridSpec};
use crate::raster::RasterWindow;

/// Owner value of a pixel no source has written.
const UNSET: u32 = u32::MAX;

#[derive(Debug, Error, PartialEq)]
pub enum CompositeError {
    #[error("window grid {window} does not match composite grid {composite}")]
    GridMismatch { window: String, composite: String },

    #[error("band {band} requested but window has {available} bands")]
    BandOutOfRange { band: usize, available: usize },
}

/// The render target: merged samples plus the rank that owns each pixel.
///
/// Ranks are positions in the catalog's precedence order, so a lower rank
/// is a higher priority. A pixel set by rank `r` is only ever overwritten
/// by a rank below `r`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeTile {
    pub grid: GridSpec,
    pub bands: usize,
    /// Band-interleaved samples; NaN where no source wrote.
    pub data: Vec<f32>,
    owner: Vec<u32>,
    /// Pixels around the tile rendered for the encoder.
    pub crop: CropOffsets,
}

impl CompositeTile {
    /// An all-nodata composite over `grid`.
    pub fn new(grid: GridSpec, bands: usize, crop: CropOffsets) -> Self {
        let pixels = grid.pixel_count();
        Self {
            grid,
            bands,
            data: vec![f32::NAN; pixels * bands],
            owner: vec![UNSET; pixels],
            crop,
        }
    }

    pub fn width(&self) -> u32 {
        self.grid.width
    }

    pub fn height(&self) -> u32 {
        self.grid.height
    }

    /// Paints the valid pixels of `window` at priority `rank`.
    ///
    /// `band_map[i]` is the window band written to composite band `i`.
    /// Returns the number of pixels written.
    pub fn merge(
        &mut self,
        window: &RasterWindow,
        band_map: &[usize],
        rank: u32,
    ) -> Result<usize, CompositeError> {
        if window.width != self.grid.width
            || window.height != self.grid.height
            || window.srs != self.grid.bbox.srs
        {
            return Err(CompositeError::GridMismatch {
                window: format!("{}x{} {}", window.width, window.height, window.srs),
                composite: format!(
                    "{}x{} {}",
                    self.grid.width, self.grid.height, self.grid.bbox.srs
                ),
            });
        }
        if let Some(&band) = band_map.iter().find(|b| **b >= window.bands) {
            return Err(CompositeError::BandOutOfRange {
                band,
                available: window.bands,
            });
        }

        let bands = self.bands;
        let mut written = 0;
        for (pixel, owner) in self.owner.iter_mut().enumerate() {
            if !window.valid[pixel] || (*owner != UNSET && *owner <= rank) {
                continue;
            }
            let src = &window.data[pixel * window.bands..(pixel + 1) * window.bands];
            let dst = &mut self.data[pixel * bands..(pixel + 1) * bands];
            for (d, b) in dst.iter_mut().zip(band_map) {
                *d = src[*b];
            }
            *owner = rank;
            written += 1;
        }
        Ok(written)
    }

    #[inline]
    pub fn is_valid(&self, col: u32, row: u32) -> bool {
        self.owner[row as usize * self.grid.width as usize + col as usize] != UNSET
    }

    /// Rank that owns a pixel, if any.
    pub fn owner(&self, col: u32, row: u32) -> Option<u32> {
        let owner = self.owner[row as usize * self.grid.width as usize + col as usize];
        (owner != UNSET).then_some(owner)
    }

    pub fn valid_count(&self) -> usize {
        self.owner.iter().filter(|o| **o != UNSET).count()
    }

    pub fn pixel_count(&self) -> usize {
        self.owner.len()
    }

    /// True once every pixel has an owner; later sources cannot change it.
    pub fn is_full(&self) -> bool {
        self.owner.iter().all(|o| *o != UNSET)
    }

    /// Band values of a pixel; NaN when unset.
    #[inline]
    pub fn pixel(&self, col: u32, row: u32) -> &[f32] {
        let start = (row as usize * self.grid.width as usize + col as usize) * self.bands;
        &self.data[start..start + self.bands]
    }

    /// Dimensions after removing the render buffer.
    pub fn cropped_size(&self) -> (u32, u32) {
        (
            self.grid.width - self.crop.left - self.crop.right,
            self.grid.height - self.crop.top - self.crop.bottom,
        )
    }

    /// Calls `f(col, row, values, valid)` for each pixel of the cropped
    /// tile in row-major order, with coordinates relative to the tile.
    pub fn for_each_cropped<F>(&self, mut f: F)
    where
        F: FnMut(u32, u32, &[f32], bool),
    {
        let (width, height) = self.cropped_size();
        for row in 0..height {
            for col in 0..width {
                let (c, r) = (col + self.crop.left, row + self.crop.top);
                f(col, row, self.pixel(c, r), self.is_valid(c, r));
            }
        }
    }

    /// Band-interleaved samples of the cropped tile.
    pub fn cropped_data(&self) -> Vec<f32> {
        let (width, height) = self.cropped_size();
        let mut out = Vec::with_capacity(width as usize * height as usize * self.bands);
        self.for_each_cropped(|_, _, values, _| out.extend_from_slice(values));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{GeoBBox, GeoTransform, SpatialRef};

    fn grid() -> GridSpec {
        GridSpec::new(
            GeoBBox::new(0.0, 0.0, 20.0, 20.0, SpatialRef::web_mercator()),
            2,
            2,
        )
    }

    fn window(values: [f32; 4], valid: [bool; 4]) -> RasterWindow {
        let g = grid();
        RasterWindow {
            width: 2,
            height: 2,
            bands: 1,
            data: values.to_vec(),
            valid: valid.to_vec(),
            srs: g.bbox.srs.clone(),
            transform: g.transform(),
        }
    }

    #[test]
    fn test_higher_priority_is_never_overwritten() {
        let mut tile = CompositeTile::new(grid(), 1, CropOffsets::default());
        let a = window([1.0, 1.0, 1.0, 1.0], [true, true, false, false]);
        let b = window([2.0, 2.0, 2.0, 2.0], [true, true, true, true]);

        assert_eq!(tile.merge(&a, &[0], 0).unwrap(), 2);
        assert_eq!(tile.merge(&b, &[0], 1).unwrap(), 2);
        assert_eq!(tile.data, vec![1.0, 1.0, 2.0, 2.0]);
        assert!(tile.is_full());
        assert_eq!(tile.owner(0, 0), Some(0));
        assert_eq!(tile.owner(0, 1), Some(1));
    }

    #[test]
    fn test_merge_order_does_not_change_result() {
        let a = window([1.0, 1.0, 1.0, 1.0], [true, false, true, false]);
        let b = window([2.0, 2.0, 2.0, 2.0], [true, true, false, false]);

        let mut forward = CompositeTile::new(grid(), 1, CropOffsets::default());
        forward.merge(&a, &[0], 0).unwrap();
        forward.merge(&b, &[0], 1).unwrap();

        let mut reverse = CompositeTile::new(grid(), 1, CropOffsets::default());
        reverse.merge(&b, &[0], 1).unwrap();
        reverse.merge(&a, &[0], 0).unwrap();

        assert_eq!(forward.data[..3], reverse.data[..3]);
        assert!(forward.data[3].is_nan() && reverse.data[3].is_nan());
    }

    #[test]
    fn test_grid_mismatch() {
        let mut tile = CompositeTile::new(grid(), 1, CropOffsets::default());
        let mut w = window([1.0; 4], [true; 4]);
        w.srs = SpatialRef::wgs84();
        assert!(matches!(
            tile.merge(&w, &[0], 0),
            Err(CompositeError::GridMismatch { .. })
        ));

        let small = RasterWindow::empty(
            1,
            1,
            1,
            SpatialRef::web_mercator(),
            GeoTransform::north_up(0.0, 20.0, 20.0, 20.0),
        );
        assert!(tile.merge(&small, &[0], 0).is_err());
    }

    #[test]
    fn test_band_map_selects_bands() {
        let g = grid();
        let w = RasterWindow {
            width: 2,
            height: 2,
            bands: 3,
            data: (0..12).map(|v| v as f32).collect(),
            valid: vec![true; 4],
            srs: g.bbox.srs.clone(),
            transform: g.transform(),
        };
        let mut tile = CompositeTile::new(g, 2, CropOffsets::default());
        tile.merge(&w, &[2, 0], 0).unwrap();
        assert_eq!(tile.pixel(1, 0), &[5.0, 3.0]);

        assert!(matches!(
            tile.merge(&w, &[3], 0),
            Err(CompositeError::BandOutOfRange { band: 3, .. })
        ));
    }

    #[test]
    fn test_crop_removes_buffer() {
        let g = GridSpec::new(
            GeoBBox::new(0.0, 0.0, 40.0, 40.0, SpatialRef::web_mercator()),
            4,
            4,
        );
        let crop = CropOffsets {
            left: 1,
            right: 1,
            top: 1,
            bottom: 1,
        };
        let mut tile = CompositeTile::new(g.clone(), 1, crop);
        let w = RasterWindow {
            width: 4,
            height: 4,
            bands: 1,
            data: (0..16).map(|v| v as f32).collect(),
            valid: vec![true; 16],
            srs: g.bbox.srs.clone(),
            transform: g.transform(),
        };
        tile.merge(&w, &[0], 0).unwrap();
        assert_eq!(tile.cropped_size(), (2, 2));
        assert_eq!(tile.cropped_data(), vec![5.0, 6.0, 9.0, 10.0]);
    }
}
