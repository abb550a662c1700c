//! Tile requests.

use std::fmt;

use super::error::RenderError;
use crate::coord::TileCoord;
use crate::encode::{OutputFormat, TileEncoder};

/// One tile to render.
///
/// `bands` holds zero-based source band indices. Without a selection the
/// first band of every source is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub tile: TileCoord,
    pub format: OutputFormat,
    pub bands: Option<Vec<usize>>,
}

impl RenderRequest {
    pub fn new(tile: TileCoord, format: OutputFormat) -> Self {
        Self {
            tile,
            format,
            bands: None,
        }
    }

    pub fn with_bands(mut self, bands: Vec<usize>) -> Self {
        self.bands = Some(bands);
        self
    }

    /// Parses a tile path `z/x/y.ext`, where `ext` may itself contain dots
    /// (`rgb.png`).
    pub fn parse(path: &str) -> Result<Self, RenderError> {
        let path = path.trim().trim_start_matches('/');
        let (coords, ext) = match path.rfind('/') {
            Some(slash) => match path[slash..].find('.') {
                Some(dot) => path.split_at(slash + dot),
                None => return Err(missing_extension(path)),
            },
            None => return Err(missing_extension(path)),
        };
        let tile: TileCoord = coords.parse()?;
        let format = parse_format(&ext[1..])?;
        Ok(Self::new(tile, format))
    }

    /// Source bands feeding each output band.
    pub fn band_map(&self) -> Vec<usize> {
        self.bands.clone().unwrap_or_else(|| vec![0])
    }

    /// Checks the band selection against the chosen encoder.
    pub fn validate(&self, encoder: &dyn TileEncoder) -> Result<(), RenderError> {
        let count = self.band_map().len();
        if !encoder.supports_bands(count) {
            return Err(RenderError::InvalidRequest(format!(
                "{} cannot encode {count} bands",
                encoder.name()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for RenderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tile, self.format)
    }
}

fn missing_extension(path: &str) -> RenderError {
    RenderError::InvalidRequest(format!("tile path '{path}' must look like z/x/y.ext"))
}

/// Resolves a format extension or rejects it.
pub fn parse_format(ext: &str) -> Result<OutputFormat, RenderError> {
    OutputFormat::from_extension(ext)
        .ok_or_else(|| RenderError::InvalidRequest(format!("unknown tile format '{ext}'")))
}

/// Parses a `bands=1,2` list. Bands are numbered from 1 the way GDAL
/// numbers them; the result is zero-based.
pub fn parse_bands(list: &str) -> Result<Vec<usize>, RenderError> {
    let invalid = || RenderError::InvalidRequest(format!("invalid band list '{list}'"));
    if list.trim().is_empty() {
        return Err(invalid());
    }
    list.split(',')
        .map(|part| match part.trim().parse::<usize>() {
            Ok(band) if band >= 1 => Ok(band - 1),
            _ => Err(invalid()),
        })
        .collect()
}
