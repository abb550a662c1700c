//! Sources read over HTTP from a local server.

mod common;

use std::io::{Read, Seek, SeekFrom};

use common::{raw_values, test_tile, tile_bounds, Fixture, TILE_SIZE};
use tilecutter::catalog::SourceDescriptor;
use tilecutter::coord::SpatialRef;
use tilecutter::encode::OutputFormat;
use tilecutter::raster::{HttpRangeReader, RemoteConfig};
use tilecutter::render::RenderRequest;

/// Bytes of a tile-aligned fixture.
fn fixture_bytes(fixture: &Fixture) -> Vec<u8> {
    let bbox = tile_bounds(&test_tile());
    fixture.raster("dem.tif", &bbox, TILE_SIZE, |col, row| {
        (row * TILE_SIZE + col) as f32
    });
    std::fs::read(fixture.path("dem.tif")).unwrap()
}

fn remote_source(url: &str) -> SourceDescriptor {
    let bbox = tile_bounds(&test_tile());
    SourceDescriptor::new(
        "remote",
        url,
        SpatialRef::web_mercator(),
        bbox.width() / TILE_SIZE as f64,
        common::wgs84_extent(&bbox),
    )
}

/// Reads the whole object, then a slice from the middle, in 4 KiB blocks.
fn read_remote(url: String) -> (u64, Vec<u8>, Vec<u8>) {
    let client = RemoteConfig::default().build_client().unwrap();
    let mut reader = HttpRangeReader::open(client, &url, 4096).unwrap();
    let len = reader.len();

    let mut whole = Vec::new();
    reader.read_to_end(&mut whole).unwrap();

    let mut middle = vec![0u8; 10_000];
    reader.seek(SeekFrom::Start(len / 2 - 77)).unwrap();
    reader.read_exact(&mut middle).unwrap();
    (len, whole, middle)
}

async fn assert_reads_match(ranges: bool) {
    let fixture = Fixture::new();
    let bytes = fixture_bytes(&fixture);
    let url = common::serve_file(bytes.clone(), ranges).await;

    let (len, whole, middle) = tokio::task::spawn_blocking(move || read_remote(url))
        .await
        .unwrap();

    assert_eq!(len, bytes.len() as u64);
    assert_eq!(whole, bytes);
    let start = bytes.len() / 2 - 77;
    assert_eq!(middle, bytes[start..start + 10_000]);
}

#[tokio::test]
async fn test_range_reads_match_file() {
    assert_reads_match(true).await;
}

#[tokio::test]
async fn test_full_responses_are_sliced_to_the_request() {
    assert_reads_match(false).await;
}

#[tokio::test]
async fn test_remote_render_matches_local() {
    let fixture = Fixture::new();
    let bytes = fixture_bytes(&fixture);
    let local = common::descriptor(
        "local",
        &fixture.path("dem.tif"),
        &tile_bounds(&test_tile()),
        TILE_SIZE,
    );
    let request = RenderRequest::new(test_tile(), OutputFormat::Raw);

    let expected = common::renderer(vec![local])
        .await
        .render(&request)
        .await
        .unwrap();

    for ranges in [true, false] {
        let url = common::serve_file(bytes.clone(), ranges).await;
        let tile = common::renderer(vec![remote_source(&url)])
            .await
            .render(&request)
            .await
            .unwrap();
        assert_eq!(tile.stats.failed, 0, "ranges={ranges}");
        assert_eq!(tile.bytes, expected.bytes, "ranges={ranges}");
        assert_eq!(raw_values(&tile.bytes)[TILE_SIZE as usize + 3], (TILE_SIZE + 3) as f32);
    }
}
