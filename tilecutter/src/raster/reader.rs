//! Window extraction: the minimal block of a source covering a target grid.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::cache::{CacheStats, ChunkCache, ChunkKey, ChunkSource, DEFAULT_READ_CACHE_SIZE};
use super::error::SourceError;
use super::geotiff::{LevelInfo, RasterMetadata};
use super::pool::{HandlePool, SharedHandle};
use super::remote::RemoteConfig;
use super::types::RasterWindow;
use crate::catalog::SourceDescriptor;
use crate::coord::{GeoBBox, GeoTransform, GridSpec, TransformerCache};

/// Default ceiling on the pixels of a single window read.
pub const DEFAULT_MAX_WINDOW_PIXELS: u64 = 16 * 1024 * 1024;

/// Default number of sources kept open.
pub const DEFAULT_OPEN_HANDLES: u64 = 256;

/// Reader settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    pub max_window_pixels: u64,
    pub read_cache_size: u64,
    pub open_handles: u64,
    pub remote: RemoteConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_window_pixels: DEFAULT_MAX_WINDOW_PIXELS,
            read_cache_size: DEFAULT_READ_CACHE_SIZE,
            open_handles: DEFAULT_OPEN_HANDLES,
            remote: RemoteConfig::default(),
        }
    }
}

/// A rectangle of pixels in one resolution level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRegion {
    col: u32,
    row: u32,
    width: u32,
    height: u32,
}

/// Reads source windows through the shared handle pool and chunk cache.
///
/// All methods block; the orchestrator calls them from
/// `spawn_blocking`.
pub struct RasterReader {
    pool: HandlePool,
    cache: ChunkCache,
    max_window_pixels: u64,
}

impl RasterReader {
    pub fn new(config: &ReaderConfig) -> Self {
        Self {
            pool: HandlePool::new(config.open_handles, config.remote.clone()),
            cache: ChunkCache::new(config.read_cache_size),
            max_window_pixels: config.max_window_pixels,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn open_handles(&self) -> u64 {
        self.pool.len()
    }

    /// Reads the part of `source` covering `target`, grown by `padding`
    /// pixels (at least one) for the resampling kernel.
    ///
    /// Returns `Ok(None)` when the source does not overlap the target.
    /// An `Unavailable` failure drops the pooled handle so a retry
    /// reopens the source.
    pub fn read_window(
        &self,
        source: &SourceDescriptor,
        target: &GridSpec,
        padding: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<RasterWindow>, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        let result = self.read_window_inner(source, target, padding, cancel);
        if matches!(result, Err(SourceError::Unavailable(_))) {
            self.pool.invalidate(&source.location);
        }
        result
    }

    fn read_window_inner(
        &self,
        source: &SourceDescriptor,
        target: &GridSpec,
        padding: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<RasterWindow>, SourceError> {
        let handle = self.pool.acquire(&source.location)?;
        let meta = Arc::clone(handle.lock().metadata());

        if let Some(declared) = &meta.srs {
            if declared != &source.srs {
                debug!(
                    source = %source.id,
                    file = %declared,
                    catalog = %source.srs,
                    "File SRS differs from catalog; using catalog"
                );
            }
        }

        let transformer = TransformerCache::global().get(target.srs(), &source.srs)?;
        let src_bbox = transformer.transform_bbox(&target.bbox)?;
        let target_pixel = (src_bbox.width() / target.width as f64)
            .min(src_bbox.height() / target.height as f64);

        let level = meta.select_level(target_pixel);
        let info = meta.levels[level];
        let transform = meta.level_transform(level);
        let inverse = transform
            .invert()
            .ok_or_else(|| SourceError::Corrupt("degenerate geotransform".to_string()))?;

        let region = match covering_region(&inverse, &src_bbox, &info, padding.max(1)) {
            Some(region) => region,
            None => return Ok(None),
        };

        let pixels = u64::from(region.width) * u64::from(region.height);
        if pixels > self.max_window_pixels {
            return Err(SourceError::WindowTooLarge {
                pixels,
                limit: self.max_window_pixels,
            });
        }

        trace!(
            source = %source.id,
            level,
            col = region.col,
            row = region.row,
            width = region.width,
            height = region.height,
            "Reading window"
        );

        let origin = ChunkSource::new(&source.id, &source.location);
        let mut data =
            self.read_region(&origin, &handle, &info, level, meta.bands, region, cancel)?;

        let nodata = source
            .nodata
            .or(meta.nodata)
            .filter(|v| !v.is_nan())
            .map(|v| v as f32);
        let bands = meta.bands.max(1);
        let mut valid: Vec<bool> = data
            .chunks_exact(bands)
            .map(|pixel| pixel.iter().all(|v| !v.is_nan() && Some(*v) != nodata))
            .collect();

        if let Some(mask) = &source.mask {
            self.apply_mask(source, mask, &meta, level, region, &mut valid, cancel)?;
        }

        for (pixel, ok) in data.chunks_exact_mut(bands).zip(&valid) {
            if !ok {
                pixel.fill(f32::NAN);
            }
        }

        Ok(Some(RasterWindow {
            width: region.width,
            height: region.height,
            bands: meta.bands,
            data,
            valid,
            srs: source.srs.clone(),
            transform: transform.offset(region.col as f64, region.row as f64),
        }))
    }

    /// Assembles a region from the chunks it intersects.
    #[allow(clippy::too_many_arguments)]
    fn read_region(
        &self,
        origin: &ChunkSource,
        handle: &SharedHandle,
        info: &LevelInfo,
        level: usize,
        bands: usize,
        region: PixelRegion,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, SourceError> {
        let width = region.width as usize;
        let mut data = vec![f32::NAN; width * region.height as usize * bands];

        let chunk_width = if info.tiled { info.chunk_width } else { info.width };
        let col_end = region.col + region.width;
        let row_end = region.row + region.height;

        for chunk_row in region.row / info.chunk_height..=(row_end - 1) / info.chunk_height {
            for chunk_col in region.col / chunk_width..=(col_end - 1) / chunk_width {
                if cancel.is_cancelled() {
                    return Err(SourceError::Cancelled);
                }

                let index = info.chunk_index(chunk_col, chunk_row);
                let chunk = self
                    .cache
                    .get_or_load(ChunkKey::new(origin, level, index), || {
                        handle.lock().read_chunk(level, index)
                    })?;

                let (origin_x, origin_y) = info.chunk_origin(index);
                let x0 = region.col.max(origin_x);
                let x1 = col_end.min(origin_x + chunk.width);
                let y0 = region.row.max(origin_y);
                let y1 = row_end.min(origin_y + chunk.height);
                if x0 >= x1 {
                    continue;
                }
                let span = (x1 - x0) as usize * bands;

                for y in y0..y1 {
                    let src = (((y - origin_y) * chunk.width + (x0 - origin_x)) as usize) * bands;
                    let dst = ((y - region.row) as usize * width + (x0 - region.col) as usize)
                        * bands;
                    data[dst..dst + span].copy_from_slice(&chunk.data[src..src + span]);
                }
            }
        }
        Ok(data)
    }

    /// Clears `valid` wherever the sidecar mask is zero.
    ///
    /// The mask is sampled nearest-neighbour from its finest level that is
    /// at least as detailed as the data level, so masks without overviews
    /// still apply to overview reads.
    #[allow(clippy::too_many_arguments)]
    fn apply_mask(
        &self,
        source: &SourceDescriptor,
        location: &str,
        meta: &RasterMetadata,
        level: usize,
        region: PixelRegion,
        valid: &mut [bool],
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        let handle = self.pool.acquire(location)?;
        let mask_meta = Arc::clone(handle.lock().metadata());
        if mask_meta.width != meta.width || mask_meta.height != meta.height {
            return Err(SourceError::Corrupt(format!(
                "mask {}x{} does not match source {}x{}",
                mask_meta.width, mask_meta.height, meta.width, meta.height
            )));
        }

        let info = meta.levels[level];
        let mask_level = mask_meta
            .levels
            .iter()
            .rposition(|m| m.width >= info.width && m.height >= info.height)
            .unwrap_or(0);
        let mask_info = mask_meta.levels[mask_level];
        let sx = mask_info.width as f64 / info.width as f64;
        let sy = mask_info.height as f64 / info.height as f64;

        let to_mask = |pos: u32, scale: f64, limit: u32| -> u32 {
            (((pos as f64 + 0.5) * scale).floor() as u32).min(limit - 1)
        };
        let col0 = to_mask(region.col, sx, mask_info.width);
        let col1 = to_mask(region.col + region.width - 1, sx, mask_info.width);
        let row0 = to_mask(region.row, sy, mask_info.height);
        let row1 = to_mask(region.row + region.height - 1, sy, mask_info.height);
        let mask_region = PixelRegion {
            col: col0,
            row: row0,
            width: col1 - col0 + 1,
            height: row1 - row0 + 1,
        };

        let origin = ChunkSource::new(&format!("{}#mask", source.id), location);
        let mask_bands = mask_meta.bands.max(1);
        let mask = self.read_region(
            &origin,
            &handle,
            &mask_info,
            mask_level,
            mask_bands,
            mask_region,
            cancel,
        )?;

        for row in 0..region.height {
            let my = to_mask(region.row + row, sy, mask_info.height) - row0;
            for col in 0..region.width {
                let mx = to_mask(region.col + col, sx, mask_info.width) - col0;
                let sample = mask[(my as usize * mask_region.width as usize + mx as usize) * mask_bands];
                if sample == 0.0 {
                    valid[(row * region.width + col) as usize] = false;
                }
            }
        }
        Ok(())
    }
}

/// Pixel region of `info` covering `bbox`, grown by `padding` and clamped.
fn covering_region(
    inverse: &GeoTransform,
    bbox: &GeoBBox,
    info: &LevelInfo,
    padding: u32,
) -> Option<PixelRegion> {
    let corners = [
        inverse.apply(bbox.min_x, bbox.min_y),
        inverse.apply(bbox.min_x, bbox.max_y),
        inverse.apply(bbox.max_x, bbox.min_y),
        inverse.apply(bbox.max_x, bbox.max_y),
    ];
    let (mut c0, mut r0) = (f64::INFINITY, f64::INFINITY);
    let (mut c1, mut r1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (c, r) in corners {
        c0 = c0.min(c);
        c1 = c1.max(c);
        r0 = r0.min(r);
        r1 = r1.max(r);
    }

    // A box touching the raster only along an edge shares no pixels.
    if !(c1 > 0.0 && r1 > 0.0 && c0 < info.width as f64 && r0 < info.height as f64) {
        return None;
    }

    let pad = padding as f64;
    let col0 = (c0.floor() - pad).max(0.0);
    let row0 = (r0.floor() - pad).max(0.0);
    let col1 = (c1.ceil() + pad).min(info.width as f64);
    let row1 = (r1.ceil() + pad).min(info.height as f64);
    if !(col0 < col1 && row0 < row1) {
        return None;
    }

    Some(PixelRegion {
        col: col0 as u32,
        row: row0 as u32,
        width: (col1 - col0) as u32,
        height: (row1 - row0) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::SpatialRef;
    use std::path::Path;
    use tiff::encoder::{colortype, TiffEncoder};
    use tiff::tags::Tag;

    /// Writes a Float32 EPSG:3857 GeoTIFF with 10 m pixels whose top-left
    /// corner is at (0, 1000). Pixel (c, r) holds `r * width + c`.
    fn write_fixture(path: &Path, width: u32, height: u32, nodata: Option<&str>) {
        let file = std::fs::File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(width, height)
            .unwrap();
        image.rows_per_strip(3).unwrap();
        let dir = image.encoder();
        dir.write_tag(Tag::ModelPixelScaleTag, &[10.0f64, 10.0, 0.0][..])
            .unwrap();
        dir.write_tag(
            Tag::ModelTiepointTag,
            &[0.0f64, 0.0, 0.0, 0.0, 1000.0, 0.0][..],
        )
        .unwrap();
        dir.write_tag(
            Tag::GeoKeyDirectoryTag,
            &[1u16, 1, 0, 1, 3072, 0, 1, 3857][..],
        )
        .unwrap();
        if let Some(nodata) = nodata {
            dir.write_tag(Tag::GdalNodata, nodata).unwrap();
        }
        let data: Vec<f32> = (0..width * height).map(|v| v as f32).collect();
        image.write_data(&data).unwrap();
    }

    fn descriptor(path: &Path) -> SourceDescriptor {
        SourceDescriptor::new(
            "fixture",
            path.to_str().unwrap(),
            SpatialRef::web_mercator(),
            10.0,
            GeoBBox::wgs84(0.0, 0.0, 0.01, 0.01),
        )
    }

    fn grid(min_x: f64, min_y: f64, max_x: f64, max_y: f64, size: u32) -> GridSpec {
        GridSpec::new(
            GeoBBox::new(min_x, min_y, max_x, max_y, SpatialRef::web_mercator()),
            size,
            size,
        )
    }

    #[test]
    fn test_reads_padded_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        write_fixture(&path, 10, 10, None);

        let reader = RasterReader::new(&ReaderConfig::default());
        // Pixels (2..4, 2..4) of the source.
        let target = grid(20.0, 960.0, 40.0, 980.0, 2);
        let window = reader
            .read_window(&descriptor(&path), &target, 0, &CancellationToken::new())
            .unwrap()
            .unwrap();

        // One pixel of padding on each side.
        assert_eq!((window.width, window.height), (4, 4));
        assert_eq!(window.transform, GeoTransform::north_up(10.0, 990.0, 10.0, 10.0));
        assert_eq!(window.value(0, 0, 0), Some(11.0));
        assert_eq!(window.value(3, 3, 0), Some(44.0));
        assert_eq!(window.valid_count(), 16);
    }

    #[test]
    fn test_window_is_clamped_to_raster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        write_fixture(&path, 10, 10, None);

        let reader = RasterReader::new(&ReaderConfig::default());
        let target = grid(-50.0, 950.0, 20.0, 1050.0, 4);
        let window = reader
            .read_window(&descriptor(&path), &target, 2, &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(window.transform.apply(0.0, 0.0), (0.0, 1000.0));
        assert_eq!(window.value(0, 0, 0), Some(0.0));
    }

    #[test]
    fn test_disjoint_target_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        write_fixture(&path, 10, 10, None);

        let reader = RasterReader::new(&ReaderConfig::default());
        let target = grid(5000.0, 5000.0, 6000.0, 6000.0, 4);
        let result = reader
            .read_window(&descriptor(&path), &target, 1, &CancellationToken::new())
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_nodata_tag_and_override_build_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        write_fixture(&path, 4, 4, Some("5"));

        let reader = RasterReader::new(&ReaderConfig::default());
        let target = grid(0.0, 960.0, 40.0, 1000.0, 4);
        let window = reader
            .read_window(&descriptor(&path), &target, 0, &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(window.value(1, 1, 0), None);
        assert!(window.pixel(1, 1)[0].is_nan());
        assert_eq!(window.valid_count(), 15);

        let overridden = descriptor(&path).with_nodata(0.0);
        let window = reader
            .read_window(&overridden, &target, 0, &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(window.value(0, 0, 0), None);
        assert_eq!(window.value(1, 1, 0), Some(5.0));
    }

    #[test]
    fn test_sidecar_mask_invalidates_zero_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        write_fixture(&path, 4, 4, None);

        // Mask value equals the pixel index, so only pixel 0 is masked.
        let mask_path = dir.path().join("dem.msk");
        write_fixture(&mask_path, 4, 4, None);

        let reader = RasterReader::new(&ReaderConfig::default());
        let source = descriptor(&path).with_mask(mask_path.to_str().unwrap());
        let target = grid(0.0, 960.0, 40.0, 1000.0, 4);
        let window = reader
            .read_window(&source, &target, 0, &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(window.value(0, 0, 0), None);
        assert_eq!(window.value(1, 0, 0), Some(1.0));
        assert_eq!(window.valid_count(), 15);
    }

    #[test]
    fn test_window_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        write_fixture(&path, 10, 10, None);

        let reader = RasterReader::new(&ReaderConfig {
            max_window_pixels: 8,
            ..ReaderConfig::default()
        });
        let target = grid(0.0, 900.0, 100.0, 1000.0, 10);
        assert!(matches!(
            reader.read_window(&descriptor(&path), &target, 0, &CancellationToken::new()),
            Err(SourceError::WindowTooLarge { limit: 8, .. })
        ));
    }

    #[test]
    fn test_cancelled_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        write_fixture(&path, 10, 10, None);

        let reader = RasterReader::new(&ReaderConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let target = grid(0.0, 900.0, 100.0, 1000.0, 10);
        assert!(matches!(
            reader.read_window(&descriptor(&path), &target, 0, &cancel),
            Err(SourceError::Cancelled)
        ));
    }

    #[test]
    fn test_repeat_reads_hit_chunk_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        write_fixture(&path, 10, 10, None);

        let reader = RasterReader::new(&ReaderConfig::default());
        let target = grid(0.0, 900.0, 100.0, 1000.0, 10);
        let source = descriptor(&path);
        for _ in 0..2 {
            reader
                .read_window(&source, &target, 0, &CancellationToken::new())
                .unwrap();
        }
        let stats = reader.cache_stats();
        assert_eq!(stats.misses, 4);
        assert_eq!(stats.hits, 4);
        assert_eq!(reader.open_handles(), 1);
    }

    #[test]
    fn test_relocated_source_is_not_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("v1.tif");
        let new = dir.path().join("v2.tif");
        write_fixture(&old, 10, 10, None);
        write_fixture(&new, 12, 10, None);

        let reader = RasterReader::new(&ReaderConfig::default());
        let target = grid(20.0, 960.0, 40.0, 980.0, 2);
        let cancel = CancellationToken::new();
        let before = reader
            .read_window(&descriptor(&old), &target, 0, &cancel)
            .unwrap()
            .unwrap();
        let after = reader
            .read_window(&descriptor(&new), &target, 0, &cancel)
            .unwrap()
            .unwrap();

        // Same id; pixel (1, 1) is 1 * width + 1.
        assert_eq!(before.value(0, 0, 0), Some(11.0));
        assert_eq!(after.value(0, 0, 0), Some(13.0));
    }
}
