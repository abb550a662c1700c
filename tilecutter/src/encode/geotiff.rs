//! Float32 GeoTIFF output.

use std::io::{Cursor, Seek, Write};

use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffKind};
use tiff::tags::Tag;

use super::{EncodeError, TileEncoder};
use crate::coord::SpatialRef;
use crate::render::CompositeTile;

const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Uncompressed Float32 GeoTIFF with 1, 3 or 4 bands.
///
/// The tile is georeferenced with ModelPixelScale and ModelTiepoint, its
/// EPSG code is written to the GeoKey directory, and nodata is declared as
/// `nan` in GDAL_NODATA.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffEncoder;

impl TileEncoder for GeoTiffEncoder {
    fn encode(&self, tile: &CompositeTile) -> Result<Vec<u8>, EncodeError> {
        let data = tile.cropped_data();
        let mut out = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut out)?;
            match tile.bands {
                1 => write_image::<_, colortype::Gray32Float>(&mut encoder, tile, &data)?,
                3 => write_image::<_, colortype::RGB32Float>(&mut encoder, tile, &data)?,
                4 => write_image::<_, colortype::RGBA32Float>(&mut encoder, tile, &data)?,
                bands => {
                    return Err(EncodeError::UnsupportedBands {
                        format: self.name(),
                        bands,
                    })
                }
            }
        }
        Ok(out.into_inner())
    }

    fn content_type(&self) -> &'static str {
        "image/tiff"
    }

    fn extension(&self) -> &'static str {
        "tif"
    }

    fn name(&self) -> &'static str {
        "Float32 GeoTIFF"
    }

    fn max_bands(&self) -> usize {
        4
    }

    fn supports_bands(&self, bands: usize) -> bool {
        matches!(bands, 1 | 3 | 4)
    }
}

fn write_image<W, C>(
    encoder: &mut TiffEncoder<W>,
    tile: &CompositeTile,
    data: &[f32],
) -> Result<(), EncodeError>
where
    W: Write + Seek,
    C: ColorType<Inner = f32>,
{
    let (width, height) = tile.cropped_size();
    let mut image = encoder.new_image::<C>(width, height)?;
    write_geotiff_tags(image.encoder(), tile)?;
    image.write_data(data)?;
    Ok(())
}

fn write_geotiff_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut tiff::encoder::DirectoryEncoder<W, K>,
    tile: &CompositeTile,
) -> Result<(), EncodeError> {
    let (res_x, res_y) = tile.grid.resolution();
    let (origin_x, origin_y) = tile
        .grid
        .transform()
        .apply(f64::from(tile.crop.left), f64::from(tile.crop.top));

    dir.write_tag(Tag::ModelPixelScaleTag, &[res_x, res_y, 0.0][..])?;
    dir.write_tag(
        Tag::ModelTiepointTag,
        &[0.0, 0.0, 0.0, origin_x, origin_y, 0.0][..],
    )?;
    dir.write_tag(Tag::GeoKeyDirectoryTag, &geokey_directory(tile.grid.srs())[..])?;
    dir.write_tag(Tag::GdalNodata, "nan")?;
    Ok(())
}

/// GeoKey directory: header `[version, revision, minor, count]` followed by
/// `[key, location, count, value]` entries.
fn geokey_directory(srs: &SpatialRef) -> Vec<u16> {
    let geographic = srs.is_geographic();
    let mut keys = vec![
        GT_MODEL_TYPE_GEO_KEY,
        0,
        1,
        if geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        },
        GT_RASTER_TYPE_GEO_KEY,
        0,
        1,
        RASTER_PIXEL_IS_AREA,
    ];
    if let Some(code) = srs.epsg().and_then(|c| u16::try_from(c).ok()) {
        let key = if geographic {
            GEOGRAPHIC_TYPE_GEO_KEY
        } else {
            PROJECTED_CS_TYPE_GEO_KEY
        };
        keys.extend_from_slice(&[key, 0, 1, code]);
    }
    let count = (keys.len() / 4) as u16;
    let mut directory = vec![1, 1, 0, count];
    directory.extend(keys);
    directory
}
