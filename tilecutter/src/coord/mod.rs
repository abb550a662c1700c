//! Coordinate conversion module
//!
//! Provides conversions between tile-grid addresses (zoom/x/y), geographic
//! coordinates, and the native projections of source rasters.

mod grid;
mod srs;
mod transform;
mod types;

pub use grid::{GeoTransform, GridSpec};
pub use srs::{epsg_definition, SpatialRef, EPSG_WEB_MERCATOR, EPSG_WGS84};
pub use transform::{
    mercator_to_wgs84, reproject_bbox, wgs84_to_mercator, ProjectionError, Transformer,
    TransformerCache,
};
pub use types::{
    CoordError, GeoBBox, TileCoord, EARTH_RADIUS, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON,
    MIN_ZOOM, WEB_MERCATOR_EXTENT,
};

use std::f64::consts::PI;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// A square power-of-two subdivision of a fixed world extent.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    extent: GeoBBox,
    tile_size: u32,
}

/// Pixel counts to crop from each side of a buffered render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropOffsets {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl CropOffsets {
    pub fn is_empty(&self) -> bool {
        *self == CropOffsets::default()
    }
}

/// A tile's render grid grown by a pixel buffer.
///
/// Sides that would cross the world extent are not buffered, so the grid
/// never samples outside the world and `crop` records only the pixels that
/// were actually added.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedTile {
    pub grid: GridSpec,
    pub crop: CropOffsets,
}

impl TileGrid {
    pub fn new(extent: GeoBBox, tile_size: u32) -> Self {
        Self { extent, tile_size }
    }

    /// The EPSG:3857 grid used by slippy-map tile servers.
    pub fn web_mercator(tile_size: u32) -> Self {
        Self::new(
            GeoBBox::new(
                -WEB_MERCATOR_EXTENT,
                -WEB_MERCATOR_EXTENT,
                WEB_MERCATOR_EXTENT,
                WEB_MERCATOR_EXTENT,
                SpatialRef::web_mercator(),
            ),
            tile_size,
        )
    }

    /// A square subdivision of the geographic extent (-180, -90, 180, 90).
    pub fn wgs84(tile_size: u32) -> Self {
        Self::new(GeoBBox::wgs84(-180.0, -90.0, 180.0, 90.0), tile_size)
    }

    pub fn extent(&self) -> &GeoBBox {
        &self.extent
    }

    pub fn srs(&self) -> &SpatialRef {
        &self.extent.srs
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Western edge of column `index`, measured from the extent origin.
    ///
    /// Both edges of every tile come from this one expression, so a tile's
    /// eastern edge is bit-identical to its neighbour's western edge.
    #[inline]
    fn column_edge(&self, index: u64, zoom: u8) -> f64 {
        let step = self.extent.width() / (1u64 << zoom) as f64;
        self.extent.min_x + index as f64 * step
    }

    /// Northern edge of row `index`; row 0 is the top of the extent.
    #[inline]
    fn row_edge(&self, index: u64, zoom: u8) -> f64 {
        let step = self.extent.height() / (1u64 << zoom) as f64;
        self.extent.max_y - index as f64 * step
    }

    /// Bounding box of a tile in the grid's reference.
    pub fn tile_bbox(&self, tile: &TileCoord) -> GeoBBox {
        let (x, y) = (u64::from(tile.x), u64::from(tile.y));
        GeoBBox::new(
            self.column_edge(x, tile.zoom),
            self.row_edge(y + 1, tile.zoom),
            self.column_edge(x + 1, tile.zoom),
            self.row_edge(y, tile.zoom),
            self.extent.srs.clone(),
        )
    }

    /// Unbuffered render grid of a tile.
    pub fn tile_grid(&self, tile: &TileCoord) -> GridSpec {
        GridSpec::new(self.tile_bbox(tile), self.tile_size, self.tile_size)
    }

    /// Render grid of a tile expanded by `buffer` pixels on each side.
    pub fn tile_grid_buffered(&self, tile: &TileCoord, buffer: u32) -> BufferedTile {
        let bbox = self.tile_bbox(tile);
        if buffer == 0 {
            return BufferedTile {
                grid: GridSpec::new(bbox, self.tile_size, self.tile_size),
                crop: CropOffsets::default(),
            };
        }

        let res_x = bbox.width() / self.tile_size as f64;
        let res_y = bbox.height() / self.tile_size as f64;
        let pad_x = buffer as f64 * res_x;
        let pad_y = buffer as f64 * res_y;

        let mut grown = bbox.clone();
        let mut crop = CropOffsets::default();

        if bbox.min_x - pad_x >= self.extent.min_x {
            grown.min_x = bbox.min_x - pad_x;
            crop.left = buffer;
        }
        if bbox.max_x + pad_x <= self.extent.max_x {
            grown.max_x = bbox.max_x + pad_x;
            crop.right = buffer;
        }
        if bbox.max_y + pad_y <= self.extent.max_y {
            grown.max_y = bbox.max_y + pad_y;
            crop.top = buffer;
        }
        if bbox.min_y - pad_y >= self.extent.min_y {
            grown.min_y = bbox.min_y - pad_y;
            crop.bottom = buffer;
        }

        let width = self.tile_size + crop.left + crop.right;
        let height = self.tile_size + crop.top + crop.bottom;
        BufferedTile {
            grid: GridSpec::new(grown, width, height),
            crop,
        }
    }
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::web_mercator(DEFAULT_TILE_SIZE)
    }
}

/// Bounding box of a tile in the default Web Mercator grid.
pub fn tile_to_bbox(tile: &TileCoord) -> GeoBBox {
    TileGrid::default().tile_bbox(tile)
}

/// Converts geographic coordinates to the Web Mercator tile containing them.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 30)
#[inline]
pub fn to_tile_coords(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = (1u64 << zoom) as f64;
    let max_index = (1u64 << zoom) - 1;

    let x = (((lon + 180.0) / 360.0 * n) as u64).min(max_index) as u32;

    let lat_rad = lat.to_radians();
    let y = (((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n) as u64).min(max_index) as u32;

    TileCoord::new(zoom, x, y)
}

/// Returns the latitude/longitude of a tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoord) -> (f64, f64) {
    let n = tile.dimension() as f64;

    let lon = tile.x as f64 / n * 360.0 - 180.0;

    let y = tile.y as f64 / n;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();

    (lat, lon)
}

/// Web Mercator pixel size in meters at the equator for a zoom level.
pub fn tile_resolution(zoom: u8, tile_size: u32) -> f64 {
    2.0 * WEB_MERCATOR_EXTENT / (tile_size as f64 * (1u64 << zoom) as f64)
}

/// How a fractional zoom level is turned into an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomRounding {
    Nearest,
    Up,
    Down,
}

/// Zoom level whose 256-pixel tiles best match a ground resolution.
///
/// Computed as `log2(2π·R / (resolution·256))` and clamped to the valid
/// zoom range.
pub fn zoom_for_resolution(meters_per_pixel: f64, rounding: ZoomRounding) -> u8 {
    if !(meters_per_pixel > 0.0) || !meters_per_pixel.is_finite() {
        return MIN_ZOOM;
    }
    let zoom = ((2.0 * PI * EARTH_RADIUS) / (meters_per_pixel * 256.0)).log2();
    let zoom = match rounding {
        ZoomRounding::Nearest => zoom.round(),
        ZoomRounding::Up => zoom.ceil(),
        ZoomRounding::Down => zoom.floor(),
    };
    zoom.clamp(MIN_ZOOM as f64, MAX_ZOOM as f64) as u8
}

/// Great-circle distance in meters between two (lon, lat) points.
pub fn haversine_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lon1, lat1) = (a.0.to_radians(), a.1.to_radians());
    let (lon2, lat2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * h.sqrt().asin()
}

/// Approximate ground resolution of a grid in meters per pixel.
///
/// Geographic boxes are measured with great-circle distances through the
/// middle of the box; projected boxes use their linear units directly.
pub fn resolution_in_meters(bbox: &GeoBBox, width: u32, height: u32) -> (f64, f64) {
    if !bbox.srs.is_geographic() {
        return (bbox.width() / width as f64, bbox.height() / height as f64);
    }
    let (cx, cy) = bbox.center();
    let across = haversine_distance((bbox.min_x, cy), (bbox.max_x, cy));
    let down = haversine_distance((cx, bbox.min_y), (cx, bbox.max_y));
    (across / width as f64, down / height as f64)
}
