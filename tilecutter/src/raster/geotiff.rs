//! GeoTIFF handles: metadata, overview levels and chunk decoding.
//!
//! A handle wraps one open `tiff::Decoder`. The decoder keeps the current
//! IFD as state, so a handle is used by one reader at a time; the pool
//! wraps each handle in a mutex.
//!
//! # Levels
//!
//! ```text
//! IFD 0  full resolution      ──► level 0
//! IFD 1  NewSubfileType = 1   ──► level 1 (overview)
//! IFD 2  NewSubfileType = 4   ──► skipped (mask)
//! IFD 3  NewSubfileType = 1   ──► level 2 (overview)
//! ```
//!
//! Levels are ordered from finest to coarsest regardless of IFD order.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::Arc;

use tiff::decoder::{ChunkType, Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::debug;

use super::error::SourceError;
use crate::coord::{GeoTransform, SpatialRef};

/// NewSubfileType bit marking a reduced-resolution copy.
const SUBFILE_REDUCED: u32 = 0x1;

/// NewSubfileType bit marking a transparency mask.
const SUBFILE_MASK: u32 = 0x4;

const GEOKEY_RASTER_TYPE: u16 = 1025;
const GEOKEY_GEOGRAPHIC_TYPE: u16 = 2048;
const GEOKEY_PROJECTED_CS_TYPE: u16 = 3072;

/// GeoKey value for a user-defined reference.
const GEOKEY_USER_DEFINED: u16 = 32767;

/// GTRasterTypeGeoKey value for PixelIsPoint.
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Tag values of large COGs (tile offsets, byte counts) can exceed the
/// decoder's default 1 MiB limit.
const IFD_VALUE_LIMIT: usize = 64 * 1024 * 1024;

/// Byte source for a decoder.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Geometry of one resolution level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelInfo {
    /// Index of the IFD holding this level.
    pub ifd: usize,
    pub width: u32,
    pub height: u32,
    pub chunk_width: u32,
    pub chunk_height: u32,
    pub tiled: bool,
    /// Bands stored in separate chunks.
    pub planar: bool,
}

impl LevelInfo {
    pub fn chunks_across(&self) -> u32 {
        if self.tiled {
            self.width.div_ceil(self.chunk_width.max(1))
        } else {
            1
        }
    }

    pub fn chunks_down(&self) -> u32 {
        self.height.div_ceil(self.chunk_height.max(1))
    }

    /// Chunks covering one band.
    pub fn chunks_per_band(&self) -> u32 {
        self.chunks_across() * self.chunks_down()
    }

    pub fn chunk_index(&self, chunk_col: u32, chunk_row: u32) -> u32 {
        chunk_row * self.chunks_across() + chunk_col
    }

    /// Pixel position of a chunk's top-left corner.
    pub fn chunk_origin(&self, index: u32) -> (u32, u32) {
        let across = self.chunks_across();
        let col = index % across;
        let row = index / across;
        let width = if self.tiled { self.chunk_width } else { 0 };
        (col * width, row * self.chunk_height)
    }

    /// Size of a chunk's data, excluding padding past the raster edge.
    pub fn chunk_data_size(&self, index: u32) -> (u32, u32) {
        let (x, y) = self.chunk_origin(index);
        let width = if self.tiled {
            self.chunk_width.min(self.width.saturating_sub(x))
        } else {
            self.width
        };
        let height = self.chunk_height.min(self.height.saturating_sub(y));
        (width, height)
    }
}

/// Metadata shared by every level of a GeoTIFF.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    /// Pixel to map transform of level 0.
    pub transform: GeoTransform,
    /// Reference declared in the GeoKeys, if any.
    pub srs: Option<SpatialRef>,
    /// Nodata value from the GDAL_NODATA tag.
    pub nodata: Option<f64>,
    /// Resolution levels, finest first. Level 0 is always present.
    pub levels: Vec<LevelInfo>,
}

impl RasterMetadata {
    /// Transform of a level: the level-0 extent spread over fewer pixels.
    pub fn level_transform(&self, level: usize) -> GeoTransform {
        match self.levels.get(level) {
            Some(info) if level > 0 => self.transform.scaled(
                self.width as f64 / info.width as f64,
                self.height as f64 / info.height as f64,
            ),
            _ => self.transform,
        }
    }

    /// Coarsest level whose pixels are no larger than `target_pixel_size`.
    ///
    /// Falls back to level 0 when even full resolution is coarser than the
    /// target.
    pub fn select_level(&self, target_pixel_size: f64) -> usize {
        let tolerance = 1.0 + 1e-9;
        let mut chosen = 0;
        for level in 1..self.levels.len() {
            let (px, py) = self.level_transform(level).pixel_size();
            if px.max(py) <= target_pixel_size * tolerance {
                chosen = level;
            } else {
                break;
            }
        }
        chosen
    }
}

/// Decoded samples of one chunk, band-interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub data: Vec<f32>,
}

impl Chunk {
    /// Decoded size in bytes, used as the cache weight.
    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// An open GeoTIFF.
pub struct GeoTiffHandle {
    decoder: Decoder<Box<dyn ReadSeek>>,
    metadata: Arc<RasterMetadata>,
    current_ifd: usize,
}

impl GeoTiffHandle {
    /// Parses the TIFF structure and GeoTIFF tags of `reader`.
    pub fn open(reader: Box<dyn ReadSeek>) -> Result<Self, SourceError> {
        let mut limits = Limits::default();
        limits.ifd_value_size = IFD_VALUE_LIMIT;
        let mut decoder = Decoder::new(reader)?.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let bands = usize::from(
            decoder
                .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)?
                .unwrap_or(1),
        );
        let transform = read_geotransform(&mut decoder)?;
        let geokeys = read_geokeys(&mut decoder)?;
        let srs = srs_from_geokeys(&geokeys);
        let transform = if geokey(&geokeys, GEOKEY_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
            // Tiepoints reference pixel centers; shift to the corner convention.
            transform.offset(-0.5, -0.5)
        } else {
            transform
        };
        let nodata = read_nodata(&mut decoder)?;

        let mut levels = vec![level_info(&mut decoder, 0)?];
        let mut ifd = 0;
        while decoder.more_images() {
            decoder.next_image()?;
            ifd += 1;

            let subfile = decoder
                .find_tag_unsigned::<u32>(Tag::NewSubfileType)?
                .unwrap_or(0);
            let samples = usize::from(
                decoder
                    .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)?
                    .unwrap_or(1),
            );
            if subfile & SUBFILE_REDUCED == 0 || subfile & SUBFILE_MASK != 0 || samples != bands {
                continue;
            }
            levels.push(level_info(&mut decoder, ifd)?);
        }
        levels[1..].sort_by(|a, b| b.width.cmp(&a.width));

        debug!(
            width,
            height,
            bands,
            overviews = levels.len() - 1,
            srs = ?srs,
            nodata = ?nodata,
            "Opened GeoTIFF"
        );

        Ok(Self {
            decoder,
            metadata: Arc::new(RasterMetadata {
                width,
                height,
                bands,
                transform,
                srs,
                nodata,
                levels,
            }),
            current_ifd: ifd,
        })
    }

    /// Opens a local file.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = File::open(path.as_ref()).map_err(|e| {
            SourceError::Unavailable(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::open(Box::new(BufReader::new(file)))
    }

    pub fn metadata(&self) -> &Arc<RasterMetadata> {
        &self.metadata
    }

    /// Decodes one chunk of a level into `f32` samples.
    ///
    /// For planar files the chunk of every band at this position is read
    /// and interleaved.
    pub fn read_chunk(&mut self, level: usize, index: u32) -> Result<Chunk, SourceError> {
        let info = *self
            .metadata
            .levels
            .get(level)
            .ok_or_else(|| SourceError::Corrupt(format!("no resolution level {}", level)))?;
        if index >= info.chunks_per_band() {
            return Err(SourceError::Corrupt(format!(
                "chunk {} out of range for level {}",
                index, level
            )));
        }

        if self.current_ifd != info.ifd {
            self.decoder.seek_to_image(info.ifd)?;
            self.current_ifd = info.ifd;
        }

        let (width, height) = info.chunk_data_size(index);
        let bands = self.metadata.bands;
        let pixels = width as usize * height as usize;

        let data = if info.planar && bands > 1 {
            let per_band = info.chunks_per_band();
            let mut data = vec![f32::NAN; pixels * bands];
            for band in 0..bands {
                let plane = to_f32(self.decoder.read_chunk(band as u32 * per_band + index)?);
                if plane.len() != pixels {
                    return Err(SourceError::Corrupt(format!(
                        "band {} chunk {} has {} samples, expected {}",
                        band,
                        index,
                        plane.len(),
                        pixels
                    )));
                }
                for (i, value) in plane.into_iter().enumerate() {
                    data[i * bands + band] = value;
                }
            }
            data
        } else {
            let data = to_f32(self.decoder.read_chunk(index)?);
            if data.len() != pixels * bands {
                return Err(SourceError::Corrupt(format!(
                    "chunk {} has {} samples, expected {}",
                    index,
                    data.len(),
                    pixels * bands
                )));
            }
            data
        };

        Ok(Chunk {
            width,
            height,
            bands,
            data,
        })
    }
}

fn level_info(
    decoder: &mut Decoder<Box<dyn ReadSeek>>,
    ifd: usize,
) -> Result<LevelInfo, SourceError> {
    let (width, height) = decoder.dimensions()?;
    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)?
        .unwrap_or(1)
        == 2;
    if width == 0 || height == 0 || chunk_width == 0 || chunk_height == 0 {
        return Err(SourceError::Corrupt(format!("IFD {} has an empty layout", ifd)));
    }
    Ok(LevelInfo {
        ifd,
        width,
        height,
        chunk_width,
        chunk_height,
        tiled: decoder.get_chunk_type() == ChunkType::Tile,
        planar,
    })
}

/// Reads ModelTransformation, or ModelPixelScale plus ModelTiepoint.
fn read_geotransform(
    decoder: &mut Decoder<Box<dyn ReadSeek>>,
) -> Result<GeoTransform, SourceError> {
    if let Some(value) = decoder.find_tag(Tag::ModelTransformationTag)? {
        let m = value.into_f64_vec()?;
        if m.len() >= 8 {
            return Ok(GeoTransform([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
        return Err(SourceError::Corrupt(format!(
            "ModelTransformation has {} values",
            m.len()
        )));
    }

    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let tiepoint = decoder
        .find_tag(Tag::ModelTiepointTag)?
        .map(|v| v.into_f64_vec())
        .transpose()?;

    match (scale, tiepoint) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            Ok(GeoTransform::north_up(
                x - i * scale[0],
                y + j * scale[1],
                scale[0],
                scale[1],
            ))
        }
        _ => Err(SourceError::Corrupt("missing georeferencing tags".to_string())),
    }
}

fn read_geokeys(decoder: &mut Decoder<Box<dyn ReadSeek>>) -> Result<Vec<u16>, SourceError> {
    Ok(decoder
        .find_tag(Tag::GeoKeyDirectoryTag)?
        .map(|v| v.into_u16_vec())
        .transpose()?
        .unwrap_or_default())
}

/// Looks up a GeoKey stored inline in the directory.
///
/// The directory is a 4-value header followed by
/// `(key, location, count, value)` entries; location 0 means the value is
/// stored in the entry itself.
fn geokey(directory: &[u16], key: u16) -> Option<u16> {
    directory
        .get(4..)?
        .chunks_exact(4)
        .find(|entry| entry[0] == key && entry[1] == 0)
        .map(|entry| entry[3])
}

fn srs_from_geokeys(directory: &[u16]) -> Option<SpatialRef> {
    let usable = |code: u16| code > 0 && code != GEOKEY_USER_DEFINED;
    geokey(directory, GEOKEY_PROJECTED_CS_TYPE)
        .filter(|c| usable(*c))
        .or_else(|| geokey(directory, GEOKEY_GEOGRAPHIC_TYPE).filter(|c| usable(*c)))
        .map(|code| SpatialRef::Epsg(u32::from(code)))
}

fn read_nodata(decoder: &mut Decoder<Box<dyn ReadSeek>>) -> Result<Option<f64>, SourceError> {
    let text = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => value.into_string()?,
        None => return Ok(None),
    };
    Ok(parse_nodata(&text))
}

/// Parses a GDAL_NODATA string such as `-9999`, `nan` or `-3.4e38`.
pub fn parse_nodata(text: &str) -> Option<f64> {
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse::<f64>()
        .ok()
}

fn to_f32(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}
