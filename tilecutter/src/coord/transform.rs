//! Point and bounding-box reprojection.
//!
//! Conversions between WGS84 and Web Mercator use closed-form spherical
//! formulas. Every other pair goes through `proj4rs`, with Web Mercator
//! endpoints routed via WGS84 so the sphere-on-ellipsoid definition of
//! EPSG:3857 never reaches a datum shift.
//!
//! ```text
//! EPSG:3857 ──(analytic)──► EPSG:4326 ──(proj4rs)──► target
//! ```

use std::f64::consts::PI;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use proj4rs::proj::Proj;
use thiserror::Error;

use super::srs::SpatialRef;
use super::types::{GeoBBox, EARTH_RADIUS, MAX_LAT, MIN_LAT};

/// Points sampled along each edge of a box during reprojection,
/// including both corners.
const DENSIFY_POINTS: usize = 21;

/// Errors raised by spatial reference handling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("unknown spatial reference EPSG:{0}")]
    UnknownSrs(u32),

    #[error("invalid spatial reference definition '{0}'")]
    InvalidDefinition(String),

    #[error("transform undefined at ({x}, {y})")]
    Undefined { x: f64, y: f64 },
}

enum Step {
    MercatorToWgs84,
    Wgs84ToMercator,
    Proj {
        src: Box<Proj>,
        dst: Box<Proj>,
        src_geographic: bool,
        dst_geographic: bool,
    },
}

/// Converts coordinates from one spatial reference to another.
///
/// Transformers are immutable once built and safe to share across threads.
pub struct Transformer {
    from: SpatialRef,
    to: SpatialRef,
    steps: Vec<Step>,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl Transformer {
    /// Builds a transformer between two references.
    pub fn new(from: &SpatialRef, to: &SpatialRef) -> Result<Self, ProjectionError> {
        let mut steps = Vec::new();

        let same = from == to || (from.is_web_mercator() && to.is_web_mercator());
        if !same {
            let mut current = from.clone();
            if from.is_web_mercator() {
                steps.push(Step::MercatorToWgs84);
                current = SpatialRef::wgs84();
            }

            let target = if to.is_web_mercator() {
                SpatialRef::wgs84()
            } else {
                to.clone()
            };

            if current != target {
                steps.push(proj_step(&current, &target)?);
            }

            if to.is_web_mercator() {
                steps.push(Step::Wgs84ToMercator);
            }
        }

        Ok(Self {
            from: from.clone(),
            to: to.clone(),
            steps,
        })
    }

    pub fn source(&self) -> &SpatialRef {
        &self.from
    }

    pub fn target(&self) -> &SpatialRef {
        &self.to
    }

    /// True when the transform leaves coordinates untouched.
    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// Transforms a single point.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        let undefined = || ProjectionError::Undefined { x, y };
        let (mut cx, mut cy) = (x, y);
        for step in &self.steps {
            (cx, cy) = match step {
                Step::MercatorToWgs84 => mercator_to_wgs84(cx, cy),
                Step::Wgs84ToMercator => wgs84_to_mercator(cx, cy),
                Step::Proj {
                    src,
                    dst,
                    src_geographic,
                    dst_geographic,
                } => {
                    let mut point = if *src_geographic {
                        (cx.to_radians(), cy.to_radians(), 0.0)
                    } else {
                        (cx, cy, 0.0)
                    };
                    proj4rs::transform::transform(src, dst, &mut point)
                        .map_err(|_| undefined())?;
                    if *dst_geographic {
                        (point.0.to_degrees(), point.1.to_degrees())
                    } else {
                        (point.0, point.1)
                    }
                }
            };
            if !cx.is_finite() || !cy.is_finite() {
                return Err(undefined());
            }
        }
        Ok((cx, cy))
    }

    /// Transforms a point, returning `None` where the transform is undefined.
    #[inline]
    pub fn try_transform(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        self.transform(x, y).ok()
    }

    /// Reprojects a bounding box into this transformer's target reference.
    ///
    /// Each edge is densified before transforming because reprojection is
    /// generally non-affine: the transformed corners alone can miss the
    /// true extent of a curved edge.
    pub fn transform_bbox(&self, bbox: &GeoBBox) -> Result<GeoBBox, ProjectionError> {
        if self.is_identity() {
            return Ok(GeoBBox {
                srs: self.to.clone(),
                ..bbox.clone()
            });
        }

        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for (x, y) in densify(bbox) {
            let (tx, ty) = self.transform(x, y)?;
            min_x = min_x.min(tx);
            min_y = min_y.min(ty);
            max_x = max_x.max(tx);
            max_y = max_y.max(ty);
        }

        Ok(GeoBBox::new(min_x, min_y, max_x, max_y, self.to.clone()))
    }
}

fn proj_step(from: &SpatialRef, to: &SpatialRef) -> Result<Step, ProjectionError> {
    let src = build_proj(from)?;
    let dst = build_proj(to)?;
    Ok(Step::Proj {
        src_geographic: src.is_latlong(),
        dst_geographic: dst.is_latlong(),
        src: Box::new(src),
        dst: Box::new(dst),
    })
}

fn build_proj(srs: &SpatialRef) -> Result<Proj, ProjectionError> {
    let definition = srs.proj_definition()?;
    Proj::from_proj_string(&definition)
        .map_err(|e| ProjectionError::InvalidDefinition(format!("{}: {}", srs, e)))
}

/// Points along the perimeter of a box, corners and edge midpoints included.
fn densify(bbox: &GeoBBox) -> Vec<(f64, f64)> {
    let segments = (DENSIFY_POINTS - 1) as f64;
    let mut points = Vec::with_capacity(DENSIFY_POINTS * 4);
    for i in 0..DENSIFY_POINTS {
        let t = i as f64 / segments;
        let x = bbox.min_x + bbox.width() * t;
        let y = bbox.min_y + bbox.height() * t;
        points.push((x, bbox.min_y));
        points.push((x, bbox.max_y));
        points.push((bbox.min_x, y));
        points.push((bbox.max_x, y));
    }
    points
}

/// Spherical Web Mercator forward projection.
///
/// Latitudes beyond the Mercator limit are clamped to it so that
/// whole-world geographic extents still project to finite boxes.
#[inline]
pub fn wgs84_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(MIN_LAT, MAX_LAT);
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Spherical Web Mercator inverse projection.
#[inline]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Process-wide cache of transformers keyed by (source, target).
///
/// Building a `proj4rs` projection parses its definition string, so
/// transformers are built once per pair and shared.
#[derive(Default)]
pub struct TransformerCache {
    entries: DashMap<(SpatialRef, SpatialRef), Arc<Transformer>>,
}

impl TransformerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide cache.
    pub fn global() -> &'static TransformerCache {
        static GLOBAL: OnceLock<TransformerCache> = OnceLock::new();
        GLOBAL.get_or_init(TransformerCache::new)
    }

    /// Returns the transformer for a pair, building it on first use.
    pub fn get(
        &self,
        from: &SpatialRef,
        to: &SpatialRef,
    ) -> Result<Arc<Transformer>, ProjectionError> {
        let key = (from.clone(), to.clone());
        if let Some(existing) = self.entries.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }
        let transformer = Arc::new(Transformer::new(from, to)?);
        Ok(Arc::clone(
            self.entries.entry(key).or_insert(transformer).value(),
        ))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reprojects a bounding box into `to`, returning the enclosing box.
///
/// Fails when either reference is unknown or the transform is undefined
/// anywhere along the box perimeter.
pub fn reproject_bbox(bbox: &GeoBBox, to: &SpatialRef) -> Result<GeoBBox, ProjectionError> {
    TransformerCache::global()
        .get(&bbox.srs, to)?
        .transform_bbox(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::WEB_MERCATOR_EXTENT;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mercator_round_trip() {
        for (lon, lat) in [(0.0, 0.0), (10.0, 51.5), (-122.4, 37.8), (139.7, -35.7)] {
            let (x, y) = wgs84_to_mercator(lon, lat);
            let (lon2, lat2) = mercator_to_wgs84(x, y);
            assert_abs_diff_eq!(lon, lon2, epsilon = 1e-9);
            assert_abs_diff_eq!(lat, lat2, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_mercator_world_edges() {
        let (x, _) = wgs84_to_mercator(180.0, 0.0);
        assert_abs_diff_eq!(x, WEB_MERCATOR_EXTENT, epsilon = 1e-6);
        let (_, y) = wgs84_to_mercator(0.0, 90.0);
        assert!(y.is_finite());
        assert_abs_diff_eq!(y, WEB_MERCATOR_EXTENT, epsilon = 1.0);
    }

    #[test]
    fn test_identity_transformer() {
        let t = Transformer::new(&SpatialRef::web_mercator(), &SpatialRef::Epsg(900913)).unwrap();
        assert!(t.is_identity());
        assert_eq!(t.transform(12.5, -3.0).unwrap(), (12.5, -3.0));
    }

    #[test]
    fn test_utm_round_trip_through_proj() {
        let to_utm = Transformer::new(&SpatialRef::wgs84(), &SpatialRef::Epsg(32633)).unwrap();
        let back = Transformer::new(&SpatialRef::Epsg(32633), &SpatialRef::wgs84()).unwrap();

        let (e, n) = to_utm.transform(15.0, 45.0).unwrap();
        // Central meridian of zone 33 maps to the false easting.
        assert_abs_diff_eq!(e, 500_000.0, epsilon = 1e-3);
        assert!(n > 4_900_000.0 && n < 5_000_000.0);

        let (lon, lat) = back.transform(e, n).unwrap();
        assert_abs_diff_eq!(lon, 15.0, epsilon = 1e-7);
        assert_abs_diff_eq!(lat, 45.0, epsilon = 1e-7);
    }

    #[test]
    fn test_mercator_to_utm_routes_via_wgs84() {
        let t = Transformer::new(&SpatialRef::web_mercator(), &SpatialRef::Epsg(32633)).unwrap();
        let (x, y) = wgs84_to_mercator(15.0, 45.0);
        let (e, _) = t.transform(x, y).unwrap();
        assert_abs_diff_eq!(e, 500_000.0, epsilon = 1e-3);
    }

    #[test]
    fn test_unknown_srs_fails() {
        let err = Transformer::new(&SpatialRef::wgs84(), &SpatialRef::Epsg(1234)).unwrap_err();
        assert_eq!(err, ProjectionError::UnknownSrs(1234));
    }

    #[test]
    fn test_reproject_bbox_encloses_densified_edges() {
        // A wide UTM box: the northern edge bows outwards in geographic
        // space, so the midpoint reaches further north than the corners.
        let utm = GeoBBox::new(
            200_000.0,
            5_000_000.0,
            800_000.0,
            5_500_000.0,
            SpatialRef::Epsg(32633),
        );
        let geo = reproject_bbox(&utm, &SpatialRef::wgs84()).unwrap();
        let t = Transformer::new(&SpatialRef::Epsg(32633), &SpatialRef::wgs84()).unwrap();
        let (_, mid_north) = t.transform(500_000.0, 5_500_000.0).unwrap();
        assert!(geo.max_y >= mid_north);
        assert_eq!(geo.srs, SpatialRef::wgs84());
    }

    #[test]
    fn test_reproject_world_to_mercator_is_finite() {
        let world = GeoBBox::wgs84(-180.0, -90.0, 180.0, 90.0);
        let merc = reproject_bbox(&world, &SpatialRef::web_mercator()).unwrap();
        assert!(merc.is_valid());
        assert_abs_diff_eq!(merc.max_x, WEB_MERCATOR_EXTENT, epsilon = 1e-6);
    }

    #[test]
    fn test_cache_reuses_transformers() {
        let cache = TransformerCache::new();
        let a = cache.get(&SpatialRef::wgs84(), &SpatialRef::web_mercator()).unwrap();
        let b = cache.get(&SpatialRef::wgs84(), &SpatialRef::web_mercator()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }
}
