//! Nodata-aware reprojection of source windows onto a target grid.
//!
//! For every target pixel center:
//!
//! ```text
//! target (col+.5, row+.5) ──affine──► map xy ──Transformer──► source xy
//!                                                                │
//!                                           inverse affine ◄─────┘
//!                                                │
//!                                     fractional source pixel ──► kernel taps
//! ```
//!
//! Taps that are nodata or fall outside the window never contribute. The
//! share of absolute kernel weight on valid taps is the pixel's coverage;
//! below `min_coverage` the output pixel is nodata, otherwise the result is
//! the weighted sum over valid taps renormalized by their weight.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::coord::{GridSpec, Transformer};
use crate::raster::RasterWindow;

/// Kernel weights below this are treated as zero, so sampling exactly on
/// the source grid reproduces source pixels.
const WEIGHT_EPSILON: f64 = 1e-6;

/// Catmull-Rom parameter.
const CUBIC_A: f64 = -0.5;

/// Resampling kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// One tap.
    Nearest,
    /// 2×2 taps.
    #[default]
    Bilinear,
    /// 4×4 Catmull-Rom taps.
    Cubic,
}

impl Resampling {
    /// Source pixels the kernel reaches beyond the sample position.
    pub fn radius(&self) -> u32 {
        match self {
            Resampling::Nearest => 0,
            Resampling::Bilinear => 1,
            Resampling::Cubic => 2,
        }
    }

    /// Coverage required when no threshold is configured.
    pub fn default_min_coverage(&self) -> f64 {
        1.0
    }
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Resampling::Nearest),
            "bilinear" => Ok(Resampling::Bilinear),
            "cubic" => Ok(Resampling::Cubic),
            other => Err(format!("unknown resampling '{}'", other)),
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resampling::Nearest => "nearest",
            Resampling::Bilinear => "bilinear",
            Resampling::Cubic => "cubic",
        })
    }
}

/// Resamples `window` onto `target`.
///
/// `transformer` maps the target's reference into the window's. The
/// result has the window's band count and the target's geometry; pixels
/// that cannot be sampled are nodata.
pub fn reproject(
    window: &RasterWindow,
    target: &GridSpec,
    kernel: Resampling,
    min_coverage: f64,
    transformer: &Transformer,
) -> RasterWindow {
    let bands = window.bands;
    let mut out = RasterWindow::empty_for_grid(target, bands);

    let inverse = match window.transform.invert() {
        Some(inverse) => inverse,
        None => return out,
    };
    let target_transform = target.transform();
    let width = target.width as usize;
    let min_coverage = min_coverage.clamp(f64::EPSILON, 1.0);

    out.data
        .par_chunks_mut(width * bands)
        .zip(out.valid.par_chunks_mut(width))
        .enumerate()
        .for_each(|(row, (values, valid))| {
            let mut acc = vec![0.0f64; bands];
            for col in 0..width {
                let (x, y) = target_transform.apply(col as f64 + 0.5, row as f64 + 0.5);
                let Some((sx, sy)) = transformer.try_transform(x, y) else {
                    continue;
                };
                let (fx, fy) = inverse.apply(sx, sy);
                let pixel = &mut values[col * bands..(col + 1) * bands];
                valid[col] = sample(window, fx, fy, kernel, min_coverage, &mut acc, pixel);
            }
        });

    out
}

/// Samples `window` at fractional pixel position `(fx, fy)`.
///
/// Writes the band values into `out` and returns true when the pixel has
/// enough valid coverage.
fn sample(
    window: &RasterWindow,
    fx: f64,
    fy: f64,
    kernel: Resampling,
    min_coverage: f64,
    acc: &mut [f64],
    out: &mut [f32],
) -> bool {
    if !fx.is_finite() || !fy.is_finite() {
        return false;
    }

    if kernel == Resampling::Nearest {
        let (col, row) = (fx.floor(), fy.floor());
        if col < 0.0 || row < 0.0 || col >= window.width as f64 || row >= window.height as f64 {
            return false;
        }
        let (col, row) = (col as u32, row as u32);
        if !window.is_valid(col, row) {
            return false;
        }
        out.copy_from_slice(window.pixel(col, row));
        return true;
    }

    // Pixel centers sit at integer + 0.5.
    let u = fx - 0.5;
    let v = fy - 0.5;
    let base_col = u.floor();
    let base_row = v.floor();
    let tx = u - base_col;
    let ty = v - base_row;

    let (wx, wy, first) = match kernel {
        Resampling::Cubic => (cubic_weights(tx), cubic_weights(ty), -1.0),
        _ => (
            [1.0 - tx, tx, 0.0, 0.0],
            [1.0 - ty, ty, 0.0, 0.0],
            0.0,
        ),
    };

    acc.fill(0.0);
    let mut total_abs = 0.0;
    let mut valid_abs = 0.0;
    let mut weight_sum = 0.0;

    for (j, wy) in wy.iter().enumerate() {
        for (i, wx) in wx.iter().enumerate() {
            let w = wx * wy;
            if w.abs() < WEIGHT_EPSILON {
                continue;
            }
            total_abs += w.abs();

            let col = base_col + first + i as f64;
            let row = base_row + first + j as f64;
            if col < 0.0 || row < 0.0 || col >= window.width as f64 || row >= window.height as f64
            {
                continue;
            }
            let (col, row) = (col as u32, row as u32);
            if !window.is_valid(col, row) {
                continue;
            }

            valid_abs += w.abs();
            weight_sum += w;
            for (a, value) in acc.iter_mut().zip(window.pixel(col, row)) {
                *a += w * f64::from(*value);
            }
        }
    }

    if total_abs == 0.0 || weight_sum.abs() < WEIGHT_EPSILON {
        return false;
    }
    if valid_abs / total_abs < min_coverage - 1e-12 {
        return false;
    }

    for (o, a) in out.iter_mut().zip(acc.iter()) {
        *o = (a / weight_sum) as f32;
    }
    true
}

/// Catmull-Rom weights for the four taps around fractional offset `t`.
fn cubic_weights(t: f64) -> [f64; 4] {
    [
        cubic(t + 1.0),
        cubic(t),
        cubic(1.0 - t),
        cubic(2.0 - t),
    ]
}

fn cubic(d: f64) -> f64 {
    let d = d.abs();
    if d <= 1.0 {
        (CUBIC_A + 2.0) * d * d * d - (CUBIC_A + 3.0) * d * d + 1.0
    } else if d < 2.0 {
        CUBIC_A * d * d * d - 5.0 * CUBIC_A * d * d + 8.0 * CUBIC_A * d - 4.0 * CUBIC_A
    } else {
        0.0
    }
}
