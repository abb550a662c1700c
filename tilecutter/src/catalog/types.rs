//! Catalog data types.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::coord::{GeoBBox, ProjectionError, SpatialRef};

/// Errors raised by catalog loading and lookup.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog cannot be queried: never loaded, or its backing
    /// store is unreachable.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// A descriptor failed validation.
    #[error("invalid source '{id}': {reason}")]
    Invalid { id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),
}

/// What the values of a source's bands mean.
///
/// Drives the choice of resampling kernel: categorical data is never
/// interpolated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandKind {
    /// Single-band elevation in the source's vertical units.
    #[default]
    Elevation,
    /// Any other continuous field (slope, temperature, ...).
    Continuous,
    /// Class codes; interpolation would invent classes.
    Categorical,
    /// Multi-band visual imagery.
    Color,
}

impl BandKind {
    /// True when values may be interpolated between samples.
    pub fn is_interpolable(&self) -> bool {
        !matches!(self, BandKind::Categorical)
    }
}

impl FromStr for BandKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elevation" => Ok(BandKind::Elevation),
            "continuous" => Ok(BandKind::Continuous),
            "categorical" => Ok(BandKind::Categorical),
            "color" | "colour" => Ok(BandKind::Color),
            other => Err(format!("unknown band kind '{}'", other)),
        }
    }
}

impl fmt::Display for BandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BandKind::Elevation => "elevation",
            BandKind::Continuous => "continuous",
            BandKind::Categorical => "categorical",
            BandKind::Color => "color",
        };
        f.write_str(name)
    }
}

/// A cataloged source raster.
///
/// Descriptors are immutable once loaded and shared read-only between
/// requests through the catalog snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique identifier.
    pub id: String,

    /// Local path, `http(s)://` URL, or `s3://bucket/key`.
    pub location: String,

    /// Native spatial reference of the raster.
    pub srs: SpatialRef,

    /// Native pixel size in the units of `srs`.
    pub resolution: f64,

    /// Footprint in EPSG:4326 as `[min_lon, min_lat, max_lon, max_lat]`.
    #[serde(serialize_with = "serialize_extent", deserialize_with = "deserialize_extent")]
    pub extent: GeoBBox,

    #[serde(default)]
    pub band_kind: BandKind,

    #[serde(default = "default_bands")]
    pub bands: u16,

    /// Explicit precedence; higher wins.
    #[serde(default)]
    pub priority: i32,

    /// Acquisition time, used to prefer newer data on ties.
    #[serde(default)]
    pub acquired_at: Option<DateTime<Utc>>,

    /// Overrides the nodata value stored in the file.
    #[serde(default)]
    pub nodata: Option<f64>,

    /// Location of a sidecar validity mask (0 = invalid).
    #[serde(default)]
    pub mask: Option<String>,

    #[serde(default)]
    pub min_zoom: Option<u8>,

    #[serde(default)]
    pub max_zoom: Option<u8>,
}

fn default_bands() -> u16 {
    1
}

impl SourceDescriptor {
    /// Creates a single-band elevation descriptor with default precedence.
    pub fn new(
        id: impl Into<String>,
        location: impl Into<String>,
        srs: SpatialRef,
        resolution: f64,
        extent: GeoBBox,
    ) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
            srs,
            resolution,
            extent,
            band_kind: BandKind::default(),
            bands: 1,
            priority: 0,
            acquired_at: None,
            nodata: None,
            mask: None,
            min_zoom: None,
            max_zoom: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_acquired_at(mut self, acquired_at: DateTime<Utc>) -> Self {
        self.acquired_at = Some(acquired_at);
        self
    }

    pub fn with_band_kind(mut self, band_kind: BandKind) -> Self {
        self.band_kind = band_kind;
        self
    }

    pub fn with_bands(mut self, bands: u16) -> Self {
        self.bands = bands;
        self
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: Option<u8>, max_zoom: Option<u8>) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    /// True when this source should be used when rendering `zoom`.
    pub fn serves_zoom(&self, zoom: u8) -> bool {
        self.min_zoom.map_or(true, |min| zoom >= min)
            && self.max_zoom.map_or(true, |max| zoom <= max)
    }

    /// Checks the invariants a descriptor must hold to enter a snapshot.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason: &str| CatalogError::Invalid {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("empty id"));
        }
        if self.location.trim().is_empty() {
            return Err(invalid("empty location"));
        }
        if !self.extent.is_valid() {
            return Err(invalid("extent is empty or not finite"));
        }
        if !self.extent.srs.is_wgs84() {
            return Err(invalid("extent must be in EPSG:4326"));
        }
        if !(self.resolution > 0.0) || !self.resolution.is_finite() {
            return Err(invalid("resolution must be positive"));
        }
        if self.bands == 0 {
            return Err(invalid("band count must be at least 1"));
        }
        if let (Some(min), Some(max)) = (self.min_zoom, self.max_zoom) {
            if min > max {
                return Err(invalid("min_zoom exceeds max_zoom"));
            }
        }
        self.srs
            .proj_definition()
            .map_err(|e| invalid(&e.to_string()))?;
        Ok(())
    }

    /// Total precedence order used by the compositor.
    ///
    /// Higher priority first, then finer resolution, then most recent
    /// acquisition, then identifier so that no two sources compare equal.
    pub fn precedence(&self, other: &SourceDescriptor) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.resolution.total_cmp(&other.resolution))
            .then_with(|| other.acquired_at.cmp(&self.acquired_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

fn serialize_extent<S: Serializer>(extent: &GeoBBox, serializer: S) -> Result<S::Ok, S::Error> {
    [extent.min_x, extent.min_y, extent.max_x, extent.max_y].serialize(serializer)
}

fn deserialize_extent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GeoBBox, D::Error> {
    let [min_x, min_y, max_x, max_y] = <[f64; 4]>::deserialize(deserializer)?;
    Ok(GeoBBox::wgs84(min_x, min_y, max_x, max_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn descriptor(id: &str) -> SourceDescriptor {
        SourceDescriptor::new(
            id,
            format!("/data/{id}.tif"),
            SpatialRef::web_mercator(),
            30.0,
            GeoBBox::wgs84(0.0, 0.0, 1.0, 1.0),
        )
    }

    #[test]
    fn test_precedence_priority_then_resolution_then_recency() {
        let high = descriptor("a").with_priority(5);
        let low = descriptor("b").with_priority(1);
        assert_eq!(high.precedence(&low), Ordering::Less);

        let mut fine = descriptor("c");
        fine.resolution = 10.0;
        let coarse = descriptor("d");
        assert_eq!(fine.precedence(&coarse), Ordering::Less);

        let newer = descriptor("e").with_acquired_at(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let older = descriptor("f").with_acquired_at(Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(newer.precedence(&older), Ordering::Less);

        let undated = descriptor("g");
        assert_eq!(older.precedence(&undated), Ordering::Less);
    }

    #[test]
    fn test_precedence_is_total() {
        let a = descriptor("a");
        let b = descriptor("b");
        assert_eq!(a.precedence(&b), Ordering::Less);
        assert_eq!(b.precedence(&a), Ordering::Greater);
        assert_eq!(a.precedence(&a), Ordering::Equal);
    }

    #[test]
    fn test_validate_rejects_bad_descriptors() {
        assert!(descriptor("ok").validate().is_ok());

        let mut empty = descriptor("empty");
        empty.extent = GeoBBox::wgs84(1.0, 1.0, 1.0, 2.0);
        assert!(matches!(empty.validate(), Err(CatalogError::Invalid { .. })));

        let mut unknown = descriptor("unknown");
        unknown.srs = SpatialRef::Epsg(1);
        assert!(unknown.validate().is_err());

        let zooms = descriptor("zooms").with_zoom_range(Some(10), Some(5));
        assert!(zooms.validate().is_err());
    }

    #[test]
    fn test_serves_zoom() {
        let d = descriptor("z").with_zoom_range(Some(4), Some(12));
        assert!(!d.serves_zoom(3));
        assert!(d.serves_zoom(4));
        assert!(d.serves_zoom(12));
        assert!(!d.serves_zoom(13));
        assert!(descriptor("any").serves_zoom(30));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "id": "srtm",
            "location": "s3://elevation/srtm.tif",
            "srs": "EPSG:4326",
            "resolution": 0.000833,
            "extent": [-10.0, 35.0, 5.0, 45.0]
        }"#;
        let d: SourceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.bands, 1);
        assert_eq!(d.band_kind, BandKind::Elevation);
        assert_eq!(d.priority, 0);
        assert_eq!(d.extent, GeoBBox::wgs84(-10.0, 35.0, 5.0, 45.0));
        assert!(d.validate().is_ok());
    }
}
