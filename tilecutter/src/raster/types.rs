//! In-memory raster windows.

use super::error::SourceError;
use crate::coord::{GeoTransform, GridSpec, SpatialRef};

/// A georeferenced block of `f32` samples with a validity mask.
///
/// Samples are band-interleaved: the value of band `b` at `(col, row)` is
/// `data[(row * width + col) * bands + b]`. Invalid pixels hold NaN in
/// every band and `false` in `valid`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterWindow {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub data: Vec<f32>,
    pub valid: Vec<bool>,
    pub srs: SpatialRef,
    /// Pixel to map transform of this window.
    pub transform: GeoTransform,
}

impl RasterWindow {
    /// A window with every pixel set to nodata.
    pub fn empty(
        width: u32,
        height: u32,
        bands: usize,
        srs: SpatialRef,
        transform: GeoTransform,
    ) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            bands,
            data: vec![f32::NAN; pixels * bands],
            valid: vec![false; pixels],
            srs,
            transform,
        }
    }

    /// A window covering `grid` with every pixel set to nodata.
    pub fn empty_for_grid(grid: &GridSpec, bands: usize) -> Self {
        Self::empty(
            grid.width,
            grid.height,
            bands,
            grid.srs().clone(),
            grid.transform(),
        )
    }

    #[inline]
    pub fn pixel_index(&self, col: u32, row: u32) -> usize {
        row as usize * self.width as usize + col as usize
    }

    #[inline]
    pub fn is_valid(&self, col: u32, row: u32) -> bool {
        self.valid[self.pixel_index(col, row)]
    }

    /// All band values of a pixel.
    #[inline]
    pub fn pixel(&self, col: u32, row: u32) -> &[f32] {
        let start = self.pixel_index(col, row) * self.bands;
        &self.data[start..start + self.bands]
    }

    /// Value of one band, or `None` for a nodata pixel.
    pub fn value(&self, col: u32, row: u32, band: usize) -> Option<f32> {
        if col >= self.width || row >= self.height || band >= self.bands {
            return None;
        }
        self.is_valid(col, row).then(|| self.pixel(col, row)[band])
    }

    pub fn pixel_count(&self) -> usize {
        self.valid.len()
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// The grid this window samples.
    pub fn grid(&self) -> GridSpec {
        GridSpec::new(
            self.transform.bounds(self.width, self.height, self.srs.clone()),
            self.width,
            self.height,
        )
    }

    /// Copies the selected bands, in order, into a new window.
    ///
    /// Band numbers are zero-based.
    pub fn select_bands(&self, bands: &[usize]) -> Result<RasterWindow, SourceError> {
        if let Some(&band) = bands.iter().find(|b| **b >= self.bands) {
            return Err(SourceError::IncompatibleBands {
                band,
                available: self.bands,
            });
        }
        let mut data = Vec::with_capacity(self.pixel_count() * bands.len());
        for pixel in self.data.chunks_exact(self.bands.max(1)) {
            data.extend(bands.iter().map(|b| pixel[*b]));
        }
        Ok(RasterWindow {
            width: self.width,
            height: self.height,
            bands: bands.len(),
            data,
            valid: self.valid.clone(),
            srs: self.srs.clone(),
            transform: self.transform,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> RasterWindow {
        let mut w = RasterWindow::empty(
            2,
            2,
            2,
            SpatialRef::web_mercator(),
            GeoTransform::north_up(0.0, 20.0, 10.0, 10.0),
        );
        w.data = vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, f32::NAN, f32::NAN];
        w.valid = vec![true, true, true, false];
        w
    }

    #[test]
    fn test_value_respects_mask() {
        let w = window();
        assert_eq!(w.value(1, 0, 1), Some(20.0));
        assert_eq!(w.value(1, 1, 0), None);
        assert_eq!(w.value(5, 0, 0), None);
        assert_eq!(w.valid_count(), 3);
    }

    #[test]
    fn test_select_bands_reorders() {
        let w = window().select_bands(&[1, 0]).unwrap();
        assert_eq!(w.bands, 2);
        assert_eq!(w.pixel(0, 0), &[10.0, 1.0]);
        assert_eq!(w.valid, vec![true, true, true, false]);

        let single = window().select_bands(&[1]).unwrap();
        assert_eq!(single.data[..3], [10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_select_missing_band_is_incompatible() {
        assert!(matches!(
            window().select_bands(&[2]),
            Err(SourceError::IncompatibleBands { band: 2, available: 2 })
        ));
    }

    #[test]
    fn test_grid_bounds() {
        let grid = window().grid();
        assert_eq!(grid.bbox.min_x, 0.0);
        assert_eq!(grid.bbox.max_y, 20.0);
        assert_eq!(grid.bbox.min_y, 0.0);
        assert_eq!(grid.bbox.max_x, 20.0);
    }
}
