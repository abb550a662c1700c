//! Immutable, precedence-ordered catalog snapshots.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::types::{CatalogError, SourceDescriptor};
use crate::coord::{reproject_bbox, GeoBBox, SpatialRef};

/// A validated set of sources sorted once into precedence order.
///
/// Lookups filter this list without re-sorting, so the order handed to the
/// compositor is always the snapshot's total order.
#[derive(Debug)]
pub struct CatalogSnapshot {
    sources: Vec<Arc<SourceDescriptor>>,
    loaded_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    /// Validates and sorts a set of descriptors.
    ///
    /// Fails on the first invalid descriptor or duplicate identifier.
    pub fn new(mut sources: Vec<SourceDescriptor>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(sources.len());
        for source in &sources {
            source.validate()?;
            if !seen.insert(source.id.as_str()) {
                return Err(CatalogError::Invalid {
                    id: source.id.clone(),
                    reason: "duplicate id".to_string(),
                });
            }
        }

        sources.sort_by(|a, b| a.precedence(b));

        Ok(Self {
            sources: sources.into_iter().map(Arc::new).collect(),
            loaded_at: Utc::now(),
        })
    }

    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            loaded_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// All sources in precedence order.
    pub fn sources(&self) -> &[Arc<SourceDescriptor>] {
        &self.sources
    }

    pub fn get(&self, id: &str) -> Option<&Arc<SourceDescriptor>> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Sources whose footprint intersects `bbox`, in precedence order.
    ///
    /// The query box is reprojected to EPSG:4326 first.
    pub fn lookup(&self, bbox: &GeoBBox) -> Result<Vec<Arc<SourceDescriptor>>, CatalogError> {
        let query = if bbox.srs.is_wgs84() {
            bbox.clone()
        } else {
            reproject_bbox(bbox, &SpatialRef::wgs84())?
        };

        Ok(self
            .sources
            .iter()
            .filter(|s| s.extent.intersects(&query))
            .cloned()
            .collect())
    }

    /// Like [`lookup`](Self::lookup), restricted to sources serving `zoom`.
    pub fn lookup_for_zoom(
        &self,
        bbox: &GeoBBox,
        zoom: u8,
    ) -> Result<Vec<Arc<SourceDescriptor>>, CatalogError> {
        let mut found = self.lookup(bbox)?;
        found.retain(|s| s.serves_zoom(zoom));
        Ok(found)
    }
}
