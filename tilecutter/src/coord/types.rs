//! Core coordinate types: tile addresses, bounding boxes and their errors.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::srs::SpatialRef;

/// Maximum latitude representable in Web Mercator.
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum latitude representable in Web Mercator.
pub const MIN_LAT: f64 = -85.05112878;

/// Minimum longitude.
pub const MIN_LON: f64 = -180.0;

/// Maximum longitude.
pub const MAX_LON: f64 = 180.0;

/// Minimum zoom level.
pub const MIN_ZOOM: u8 = 0;

/// Maximum zoom level. `2^30` still fits comfortably in a `u32` tile index.
pub const MAX_ZOOM: u8 = 30;

/// Half-width of the Web Mercator world square in meters.
pub const WEB_MERCATOR_EXTENT: f64 = 20037508.342789244;

/// Semi-major axis of the WGS84 ellipsoid in meters.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Errors raised when building or parsing tile coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("invalid zoom level {0} (must be 0..=30)")]
    InvalidZoom(u8),

    #[error("tile {x}/{y} is outside the {dimension}x{dimension} grid at zoom {zoom}")]
    TileOutOfRange {
        zoom: u8,
        x: u32,
        y: u32,
        dimension: u64,
    },

    #[error("invalid latitude {0}")]
    InvalidLatitude(f64),

    #[error("invalid longitude {0}")]
    InvalidLongitude(f64),

    #[error("malformed tile address '{0}'")]
    MalformedTile(String),
}

/// A tile address in a power-of-two grid.
///
/// Row 0 is the northern edge of the grid; column 0 is the western edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Creates a validated tile coordinate.
    pub fn new(zoom: u8, x: u32, y: u32) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        let dimension = 1u64 << zoom;
        if u64::from(x) >= dimension || u64::from(y) >= dimension {
            return Err(CoordError::TileOutOfRange {
                zoom,
                x,
                y,
                dimension,
            });
        }
        Ok(Self { zoom, x, y })
    }

    /// Number of tiles along one axis at this tile's zoom level.
    #[inline]
    pub fn dimension(&self) -> u64 {
        1u64 << self.zoom
    }

    /// Returns the parent tile, or `None` at zoom 0.
    pub fn parent(&self) -> Option<TileCoord> {
        if self.zoom == 0 {
            return None;
        }
        Some(TileCoord {
            zoom: self.zoom - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Returns the four children in NW, NE, SW, SE order.
    pub fn children(&self) -> Option<[TileCoord; 4]> {
        if self.zoom >= MAX_ZOOM {
            return None;
        }
        let zoom = self.zoom + 1;
        let (x, y) = (self.x * 2, self.y * 2);
        Some([
            TileCoord { zoom, x, y },
            TileCoord { zoom, x: x + 1, y },
            TileCoord { zoom, x, y: y + 1 },
            TileCoord {
                zoom,
                x: x + 1,
                y: y + 1,
            },
        ])
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

impl FromStr for TileCoord {
    type Err = CoordError;

    /// Parses `z/x/y`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CoordError::MalformedTile(s.to_string());
        let mut parts = s.trim().trim_matches('/').split('/');
        let zoom = parts
            .next()
            .and_then(|p| p.parse::<u8>().ok())
            .ok_or_else(malformed)?;
        let x = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(malformed)?;
        let y = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }
        TileCoord::new(zoom, x, y)
    }
}

/// An axis-aligned bounding box tagged with its spatial reference.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoBBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub srs: SpatialRef,
}

impl GeoBBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, srs: SpatialRef) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            srs,
        }
    }

    /// Convenience constructor for a longitude/latitude box in EPSG:4326.
    pub fn wgs84(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(min_lon, min_lat, max_lon, max_lat, SpatialRef::wgs84())
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when the box has a positive, finite area.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.max_x > self.min_x
            && self.max_y > self.min_y
    }

    /// True when the interiors of the two boxes overlap.
    ///
    /// Boxes that only share an edge do not intersect. Both boxes are
    /// assumed to be in the same spatial reference.
    pub fn intersects(&self, other: &GeoBBox) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }

    /// Overlapping region of two boxes, keeping this box's reference.
    pub fn intersection(&self, other: &GeoBBox) -> Option<GeoBBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(GeoBBox::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
            self.srs.clone(),
        ))
    }

    /// True when `other` lies entirely within this box.
    pub fn contains(&self, other: &GeoBBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Grows the box by `dx` horizontally and `dy` vertically on each side.
    pub fn expand(&self, dx: f64, dy: f64) -> GeoBBox {
        GeoBBox::new(
            self.min_x - dx,
            self.min_y - dy,
            self.max_x + dx,
            self.max_y + dy,
            self.srs.clone(),
        )
    }

    /// Geometric center of the box.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

impl fmt::Display for GeoBBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.6}, {:.6}, {:.6}, {:.6}] ({})",
            self.min_x, self.min_y, self.max_x, self.max_y, self.srs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_coord_validates_range() {
        assert!(TileCoord::new(0, 0, 0).is_ok());
        assert!(TileCoord::new(3, 7, 7).is_ok());
        assert!(matches!(
            TileCoord::new(3, 8, 0),
            Err(CoordError::TileOutOfRange { dimension: 8, .. })
        ));
        assert_eq!(
            TileCoord::new(31, 0, 0),
            Err(CoordError::InvalidZoom(31))
        );
    }

    #[test]
    fn test_tile_coord_parse() {
        let tile: TileCoord = "12/654/1583".parse().unwrap();
        assert_eq!(tile, TileCoord::new(12, 654, 1583).unwrap());
        assert_eq!(tile.to_string(), "12/654/1583");
    }

    #[test]
    fn test_tile_coord_parse_rejects_garbage() {
        for input in ["", "1/2", "a/b/c", "1/2/3/4", "1/-2/0", "2/4/0"] {
            assert!(input.parse::<TileCoord>().is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_parent_and_children_are_inverse() {
        let tile = TileCoord::new(5, 17, 9).unwrap();
        for child in tile.children().unwrap() {
            assert_eq!(child.parent(), Some(tile));
        }
        assert_eq!(TileCoord::new(0, 0, 0).unwrap().parent(), None);
    }

    #[test]
    fn test_bbox_intersection_excludes_shared_edges() {
        let a = GeoBBox::wgs84(0.0, 0.0, 10.0, 10.0);
        let b = GeoBBox::wgs84(10.0, 0.0, 20.0, 10.0);
        let c = GeoBBox::wgs84(5.0, 5.0, 15.0, 15.0);

        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        let overlap = a.intersection(&c).unwrap();
        assert_eq!(
            (overlap.min_x, overlap.min_y, overlap.max_x, overlap.max_y),
            (5.0, 5.0, 10.0, 10.0)
        );
    }

    #[test]
    fn test_bbox_validity() {
        assert!(GeoBBox::wgs84(0.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!GeoBBox::wgs84(1.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!GeoBBox::wgs84(0.0, f64::NAN, 1.0, 1.0).is_valid());
    }
}
