//! Affine pixel grids.

use super::srs::SpatialRef;
use super::types::GeoBBox;

/// Affine transform from pixel (column, row) to map coordinates.
///
/// Uses the six-coefficient GDAL layout:
///
/// ```text
/// x = c0 + col * c1 + row * c2
/// y = c3 + col * c4 + row * c5
/// ```
///
/// Pixel `(0, 0)` is the top-left corner of the top-left pixel, so the
/// center of pixel `(i, j)` is at `(i + 0.5, j + 0.5)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// A north-up transform with square or rectangular pixels.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform([origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height])
    }

    /// Transform mapping a `width`×`height` grid exactly onto `bbox`.
    pub fn from_bbox(bbox: &GeoBBox, width: u32, height: u32) -> Self {
        Self::north_up(
            bbox.min_x,
            bbox.max_y,
            bbox.width() / width as f64,
            bbox.height() / height as f64,
        )
    }

    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let c = &self.0;
        (
            c[0] + col * c[1] + row * c[2],
            c[3] + col * c[4] + row * c[5],
        )
    }

    /// Inverse transform, or `None` for a degenerate matrix.
    pub fn invert(&self) -> Option<GeoTransform> {
        let c = &self.0;
        let det = c[1] * c[5] - c[2] * c[4];
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        let a = c[5] * inv_det;
        let b = -c[2] * inv_det;
        let d = -c[4] * inv_det;
        let e = c[1] * inv_det;
        Some(GeoTransform([
            -(a * c[0] + b * c[3]),
            a,
            b,
            -(d * c[0] + e * c[3]),
            d,
            e,
        ]))
    }

    /// True when the grid has no rotation terms.
    pub fn is_north_up(&self) -> bool {
        self.0[2] == 0.0 && self.0[4] == 0.0
    }

    /// Pixel size as (width, height), both positive.
    pub fn pixel_size(&self) -> (f64, f64) {
        let c = &self.0;
        (
            (c[1] * c[1] + c[4] * c[4]).sqrt(),
            (c[2] * c[2] + c[5] * c[5]).sqrt(),
        )
    }

    /// Transform of the same extent resampled by the given factors.
    ///
    /// A factor of 2 halves the resolution, as for an overview level.
    pub fn scaled(&self, factor_x: f64, factor_y: f64) -> GeoTransform {
        let c = &self.0;
        GeoTransform([
            c[0],
            c[1] * factor_x,
            c[2] * factor_y,
            c[3],
            c[4] * factor_x,
            c[5] * factor_y,
        ])
    }

    /// Transform of a sub-window whose top-left pixel is `(col, row)`.
    pub fn offset(&self, col: f64, row: f64) -> GeoTransform {
        let (x, y) = self.apply(col, row);
        let c = &self.0;
        GeoTransform([x, c[1], c[2], y, c[4], c[5]])
    }

    /// Map-space bounding box of a `width`×`height` grid.
    pub fn bounds(&self, width: u32, height: u32, srs: SpatialRef) -> GeoBBox {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(width as f64, 0.0),
            self.apply(0.0, height as f64),
            self.apply(width as f64, height as f64),
        ];
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        GeoBBox::new(min_x, min_y, max_x, max_y, srs)
    }
}

/// A target raster grid: an extent sampled at a fixed pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub bbox: GeoBBox,
    pub width: u32,
    pub height: u32,
}

impl GridSpec {
    pub fn new(bbox: GeoBBox, width: u32, height: u32) -> Self {
        Self {
            bbox,
            width,
            height,
        }
    }

    pub fn srs(&self) -> &SpatialRef {
        &self.bbox.srs
    }

    pub fn transform(&self) -> GeoTransform {
        GeoTransform::from_bbox(&self.bbox, self.width, self.height)
    }

    /// Pixel size as (width, height) in the grid's units.
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.bbox.width() / self.width as f64,
            self.bbox.height() / self.height as f64,
        )
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_north_up_apply_and_invert() {
        let gt = GeoTransform::north_up(1000.0, 2000.0, 10.0, 5.0);
        assert_eq!(gt.apply(0.0, 0.0), (1000.0, 2000.0));
        assert_eq!(gt.apply(2.0, 4.0), (1020.0, 1980.0));

        let inv = gt.invert().unwrap();
        let (col, row) = inv.apply(1020.0, 1980.0);
        assert_abs_diff_eq!(col, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(row, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotated_invert_round_trip() {
        let gt = GeoTransform([100.0, 2.0, 0.5, 50.0, 0.25, -3.0]);
        let inv = gt.invert().unwrap();
        let (x, y) = gt.apply(7.5, 11.25);
        let (col, row) = inv.apply(x, y);
        assert_abs_diff_eq!(col, 7.5, epsilon = 1e-9);
        assert_abs_diff_eq!(row, 11.25, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_transform_has_no_inverse() {
        assert!(GeoTransform([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).invert().is_none());
    }

    #[test]
    fn test_offset_and_scale() {
        let gt = GeoTransform::north_up(0.0, 100.0, 1.0, 1.0);
        let window = gt.offset(10.0, 20.0);
        assert_eq!(window.apply(0.0, 0.0), (10.0, 80.0));
        let overview = gt.scaled(2.0, 2.0);
        assert_eq!(overview.pixel_size(), (2.0, 2.0));
    }

    #[test]
    fn test_grid_spec_transform_matches_bbox() {
        let grid = GridSpec::new(GeoBBox::wgs84(-10.0, -5.0, 10.0, 5.0), 20, 10);
        let gt = grid.transform();
        let bounds = gt.bounds(20, 10, SpatialRef::wgs84());
        assert_eq!(bounds, grid.bbox);
        assert_eq!(grid.resolution(), (1.0, 1.0));
    }
}
