//! Shared fixtures: small EPSG:3857 GeoTIFFs aligned to tile grids and
//! renderers over them.

#![allow(dead_code)]

use std::fs::File;
use std::io::BufWriter;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use tilecutter::catalog::{Catalog, SnapshotCatalog, SourceDescriptor, StaticCatalogLoader};
use tilecutter::coord::{mercator_to_wgs84, GeoBBox, SpatialRef, TileCoord, TileGrid};
use tilecutter::raster::{RasterReader, ReaderConfig, RemoteConfig};
use tilecutter::render::{RenderConfig, Renderer};

pub const TILE_SIZE: u32 = 256;

/// A tile over Zurich; any zoom-12 tile would do.
pub fn test_tile() -> TileCoord {
    TileCoord::new(12, 2144, 1434).unwrap()
}

pub fn grid() -> TileGrid {
    TileGrid::web_mercator(TILE_SIZE)
}

/// Mercator bounds of `tile`.
pub fn tile_bounds(tile: &TileCoord) -> GeoBBox {
    grid().tile_bbox(tile)
}

/// West or east half of `bbox`.
pub fn half(bbox: &GeoBBox, west: bool) -> GeoBBox {
    let mid = (bbox.min_x + bbox.max_x) / 2.0;
    if west {
        GeoBBox::new(bbox.min_x, bbox.min_y, mid, bbox.max_y, bbox.srs.clone())
    } else {
        GeoBBox::new(mid, bbox.min_y, bbox.max_x, bbox.max_y, bbox.srs.clone())
    }
}

/// Writes a single-band Float32 GeoTIFF covering `bbox` (EPSG:3857).
pub fn write_geotiff<F>(path: &Path, bbox: &GeoBBox, width: u32, height: u32, value: F)
where
    F: Fn(u32, u32) -> f32,
{
    let data: Vec<f32> = (0..height)
        .flat_map(|row| (0..width).map(move |col| (col, row)))
        .map(|(col, row)| value(col, row))
        .collect();

    let file = BufWriter::new(File::create(path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(width, height)
        .unwrap();
    let dir = image.encoder();
    let pixel_x = (bbox.max_x - bbox.min_x) / width as f64;
    let pixel_y = (bbox.max_y - bbox.min_y) / height as f64;
    dir.write_tag(Tag::ModelPixelScaleTag, &[pixel_x, pixel_y, 0.0][..])
        .unwrap();
    dir.write_tag(
        Tag::ModelTiepointTag,
        &[0.0, 0.0, 0.0, bbox.min_x, bbox.max_y, 0.0][..],
    )
    .unwrap();
    dir.write_tag(
        Tag::GeoKeyDirectoryTag,
        &[1u16, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 3857][..],
    )
    .unwrap();
    dir.write_tag(Tag::GdalNodata, "nan").unwrap();
    image.write_data(&data).unwrap();
}

/// Catalog entry for a Mercator raster covering `bbox` at `width` pixels.
pub fn descriptor(id: &str, path: &Path, bbox: &GeoBBox, width: u32) -> SourceDescriptor {
    SourceDescriptor::new(
        id,
        path.to_string_lossy(),
        SpatialRef::web_mercator(),
        (bbox.max_x - bbox.min_x) / width as f64,
        wgs84_extent(bbox),
    )
}

/// Geographic footprint of a Mercator box.
pub fn wgs84_extent(bbox: &GeoBBox) -> GeoBBox {
    let (min_lon, min_lat) = mercator_to_wgs84(bbox.min_x, bbox.min_y);
    let (max_lon, max_lat) = mercator_to_wgs84(bbox.max_x, bbox.max_y);
    GeoBBox::wgs84(min_lon, min_lat, max_lon, max_lat)
}

/// A temp directory of fixture rasters.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// A raster exactly aligned with `bbox` at tile resolution.
    pub fn raster<F>(&self, name: &str, bbox: &GeoBBox, width: u32, value: F) -> SourceDescriptor
    where
        F: Fn(u32, u32) -> f32,
    {
        let path = self.path(name);
        write_geotiff(&path, bbox, width, TILE_SIZE, value);
        descriptor(name, &path, bbox, width)
    }

    /// A valid raster cut to half its length.
    pub fn truncated(&self, name: &str, bbox: &GeoBBox) -> SourceDescriptor {
        let source = self.raster(name, bbox, TILE_SIZE, |_, _| 1.0);
        let bytes = std::fs::read(self.path(name)).unwrap();
        std::fs::write(self.path(name), &bytes[..bytes.len() / 2]).unwrap();
        source
    }

    /// A `.tif` that is not a TIFF.
    pub fn corrupt(&self, name: &str, bbox: &GeoBBox) -> SourceDescriptor {
        let path = self.path(name);
        std::fs::write(&path, b"definitely not a tiff").unwrap();
        descriptor(name, &path, bbox, TILE_SIZE)
    }
}

/// Serves `bytes` at `/dem.tif` on a local port and returns its URL.
///
/// With `ranges` false the server ignores `Range` and always sends the
/// whole object with 200.
pub async fn serve_file(bytes: Vec<u8>, ranges: bool) -> String {
    let state = ServedFile {
        bytes: Bytes::from(bytes),
        ranges,
    };
    let app = Router::new()
        .route("/dem.tif", get(serve_bytes))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/dem.tif", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    url
}

#[derive(Clone)]
struct ServedFile {
    bytes: Bytes,
    ranges: bool,
}

async fn serve_bytes(State(file): State<ServedFile>, headers: HeaderMap) -> Response {
    let len = file.bytes.len();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range)
        .filter(|&(start, _)| file.ranges && start < len);

    match range {
        Some((start, end)) => {
            let end = end.min(len - 1);
            (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_LENGTH, (end - start + 1).to_string()),
                    (header::CONTENT_RANGE, format!("bytes {start}-{end}/{len}")),
                ],
                file.bytes.slice(start..=end),
            )
                .into_response()
        }
        None => (
            StatusCode::OK,
            [(header::CONTENT_LENGTH, len.to_string())],
            file.bytes.clone(),
        )
            .into_response(),
    }
}

/// `bytes=start-end`
fn parse_range(value: &str) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// An HTTP endpoint that accepts connections and never answers.
///
/// Keep the listener alive for as long as requests should hang.
pub fn silent_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/hang.tif", listener.local_addr().unwrap());
    (listener, url)
}

pub async fn catalog(sources: Vec<SourceDescriptor>) -> Arc<SnapshotCatalog> {
    let catalog = SnapshotCatalog::new(Arc::new(StaticCatalogLoader::new(sources)));
    catalog.refresh().await.unwrap();
    Arc::new(catalog)
}

/// Reader whose remote reads give up after two seconds.
pub fn reader() -> Arc<RasterReader> {
    let config = ReaderConfig {
        remote: RemoteConfig {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            ..RemoteConfig::default()
        },
        ..ReaderConfig::default()
    };
    Arc::new(RasterReader::new(&config))
}

pub fn renderer_with(catalog: Arc<SnapshotCatalog>, config: RenderConfig) -> Renderer {
    Renderer::new(catalog as Arc<dyn Catalog>, reader(), config)
}

pub async fn renderer(sources: Vec<SourceDescriptor>) -> Renderer {
    renderer_with(catalog(sources).await, RenderConfig::default())
}

/// Little-endian f32 samples from a raw tile.
pub fn raw_values(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
