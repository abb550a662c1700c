//! Spatial reference identifiers.
//!
//! A [`SpatialRef`] is either an EPSG code resolved through a small built-in
//! definition table, or a raw PROJ.4 definition string. Web Mercator and
//! WGS84 are recognised by code so the transform layer can use analytic
//! fast paths for them.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::transform::ProjectionError;

/// EPSG code of WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// EPSG code of spherical Web Mercator.
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// Legacy alias for Web Mercator still found in older GeoTIFFs.
const EPSG_GOOGLE: u32 = 900913;

/// A spatial reference system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpatialRef {
    /// A reference identified by EPSG code.
    Epsg(u32),
    /// A PROJ.4 definition such as `+proj=utm +zone=33 +datum=WGS84`.
    Proj4(Arc<str>),
}

impl SpatialRef {
    pub fn wgs84() -> Self {
        SpatialRef::Epsg(EPSG_WGS84)
    }

    pub fn web_mercator() -> Self {
        SpatialRef::Epsg(EPSG_WEB_MERCATOR)
    }

    /// Returns the EPSG code, if this reference has one.
    pub fn epsg(&self) -> Option<u32> {
        match self {
            SpatialRef::Epsg(code) => Some(*code),
            SpatialRef::Proj4(_) => None,
        }
    }

    pub fn is_web_mercator(&self) -> bool {
        matches!(self, SpatialRef::Epsg(EPSG_WEB_MERCATOR | EPSG_GOOGLE))
    }

    pub fn is_wgs84(&self) -> bool {
        matches!(self, SpatialRef::Epsg(EPSG_WGS84))
    }

    /// True when coordinates are longitude/latitude in degrees.
    pub fn is_geographic(&self) -> bool {
        match self {
            SpatialRef::Epsg(code) => matches!(*code, 4000..=4999),
            SpatialRef::Proj4(def) => {
                def.contains("+proj=longlat") || def.contains("+proj=latlong")
            }
        }
    }

    /// Returns the PROJ.4 definition for this reference.
    pub fn proj_definition(&self) -> Result<Cow<'static, str>, ProjectionError> {
        match self {
            SpatialRef::Epsg(code) => {
                epsg_definition(*code).ok_or(ProjectionError::UnknownSrs(*code))
            }
            SpatialRef::Proj4(def) => Ok(Cow::Owned(def.to_string())),
        }
    }
}

/// Resolves an EPSG code to a PROJ.4 definition.
///
/// Covers the references commonly found in elevation archives: the WGS84
/// and NAD83/ETRS89 geographic systems, the Mercator variants, the WGS84
/// UTM zones and a handful of national grids.
pub fn epsg_definition(code: u32) -> Option<Cow<'static, str>> {
    let def = match code {
        4326 => "+proj=longlat +datum=WGS84 +no_defs",
        4269 => "+proj=longlat +datum=NAD83 +no_defs",
        4258 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs",
        3857 | 900913 => {
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
        }
        3395 => "+proj=merc +lon_0=0 +k=1 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs",
        27700 => {
            "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 \
             +ellps=airy +towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489 +units=m +no_defs"
        }
        2193 => {
            "+proj=tmerc +lat_0=0 +lon_0=173 +k=0.9996 +x_0=1600000 +y_0=10000000 \
             +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        }
        3035 => {
            "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 \
             +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        }
        32601..=32660 => {
            return Some(Cow::Owned(format!(
                "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
                code - 32600
            )))
        }
        32701..=32760 => {
            return Some(Cow::Owned(format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
                code - 32700
            )))
        }
        _ => return None,
    };
    Some(Cow::Borrowed(def))
}

impl fmt::Display for SpatialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialRef::Epsg(code) => write!(f, "EPSG:{}", code),
            SpatialRef::Proj4(def) => f.write_str(def),
        }
    }
}

impl FromStr for SpatialRef {
    type Err = ProjectionError;

    /// Accepts `EPSG:3857`, a bare `3857`, or a `+proj=` definition.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('+') {
            return Ok(SpatialRef::Proj4(Arc::from(s)));
        }
        let code = match s.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(ProjectionError::InvalidDefinition(s.to_string())),
            None => s,
        };
        code.trim()
            .parse::<u32>()
            .map(SpatialRef::Epsg)
            .map_err(|_| ProjectionError::InvalidDefinition(s.to_string()))
    }
}

impl Serialize for SpatialRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpatialRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_epsg_forms() {
        assert_eq!("EPSG:3857".parse::<SpatialRef>().unwrap(), SpatialRef::Epsg(3857));
        assert_eq!("epsg:4326".parse::<SpatialRef>().unwrap(), SpatialRef::Epsg(4326));
        assert_eq!("32633".parse::<SpatialRef>().unwrap(), SpatialRef::Epsg(32633));
    }

    #[test]
    fn test_parse_proj_string() {
        let srs: SpatialRef = "+proj=utm +zone=33 +datum=WGS84".parse().unwrap();
        assert!(matches!(srs, SpatialRef::Proj4(_)));
        assert!(!srs.is_geographic());
    }

    #[test]
    fn test_parse_rejects_other_authorities() {
        assert!("ESRI:102100".parse::<SpatialRef>().is_err());
        assert!("mercator".parse::<SpatialRef>().is_err());
    }

    #[test]
    fn test_utm_definitions() {
        let north = epsg_definition(32633).unwrap();
        assert!(north.contains("+zone=33"));
        assert!(!north.contains("+south"));
        let south = epsg_definition(32719).unwrap();
        assert!(south.contains("+zone=19"));
        assert!(south.contains("+south"));
    }

    #[test]
    fn test_unknown_code_is_error() {
        assert!(matches!(
            SpatialRef::Epsg(1234).proj_definition(),
            Err(ProjectionError::UnknownSrs(1234))
        ));
    }

    #[test]
    fn test_mercator_aliases() {
        assert!(SpatialRef::Epsg(900913).is_web_mercator());
        assert!(SpatialRef::web_mercator().is_web_mercator());
        assert!(SpatialRef::wgs84().is_geographic());
        assert!(!SpatialRef::web_mercator().is_geographic());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&SpatialRef::Epsg(3857)).unwrap();
        assert_eq!(json, "\"EPSG:3857\"");
        let back: SpatialRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SpatialRef::Epsg(3857));
    }
}
