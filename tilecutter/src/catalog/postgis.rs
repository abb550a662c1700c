//! PostGIS-backed catalog loader.
//!
//! Reads source footprints from a table with this shape:
//!
//! ```sql
//! CREATE TABLE footprints (
//!     id          text PRIMARY KEY,
//!     location    text NOT NULL,
//!     srs         text NOT NULL,          -- 'EPSG:32633' or a +proj string
//!     resolution  double precision NOT NULL,
//!     geom        geometry NOT NULL,      -- footprint, any SRID
//!     band_kind   text,                   -- elevation | continuous | categorical | color
//!     bands       integer,
//!     priority    integer,
//!     acquired_at timestamptz,
//!     nodata      double precision,
//!     mask        text,
//!     min_zoom    smallint,
//!     max_zoom    smallint
//! );
//! ```
//!
//! Footprints are transformed to EPSG:4326 in the query; the loader never
//! writes to the database.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use super::loader::{BoxFuture, CatalogLoader};
use super::types::{BandKind, CatalogError, SourceDescriptor};
use super::DEFAULT_TABLE;
use crate::coord::{GeoBBox, SpatialRef};

/// Connection settings for [`PostgisCatalogLoader`].
#[derive(Debug, Clone)]
pub struct PostgisConfig {
    pub database_url: String,
    pub table: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PostgisConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            table: DEFAULT_TABLE.to_string(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Loads the catalog from a PostGIS footprint table.
pub struct PostgisCatalogLoader {
    pool: PgPool,
    query: String,
    table: String,
}

impl PostgisCatalogLoader {
    /// Builds the loader with a lazily connecting pool.
    ///
    /// No connection is made until the first load, so an unreachable
    /// database surfaces as [`CatalogError::Unavailable`] from `load`
    /// rather than failing startup. Must be called within a Tokio runtime.
    pub fn new(config: &PostgisConfig) -> Result<Self, CatalogError> {
        if !is_valid_table_name(&config.table) {
            return Err(CatalogError::Invalid {
                id: config.table.clone(),
                reason: "table name must be a plain or schema-qualified identifier".to_string(),
            });
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy(&config.database_url)
            .map_err(|e| CatalogError::Unavailable(format!("invalid database URL: {}", e)))?;

        Ok(Self {
            pool,
            query: footprint_query(&config.table),
            table: config.table.clone(),
        })
    }
}

impl CatalogLoader for PostgisCatalogLoader {
    fn load(&self) -> BoxFuture<'_, Result<Vec<SourceDescriptor>, CatalogError>> {
        Box::pin(async move {
            let rows = sqlx::query(&self.query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

            debug!(table = %self.table, rows = rows.len(), "Fetched catalog footprints");
            rows.iter().map(descriptor_from_row).collect()
        })
    }

    fn describe(&self) -> String {
        format!("postgis:{}", self.table)
    }
}

fn is_valid_table_name(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

fn footprint_query(table: &str) -> String {
    format!(
        "SELECT id::text AS id, location, srs, resolution::float8 AS resolution, \
                ST_XMin(e)::float8 AS min_x, ST_YMin(e)::float8 AS min_y, \
                ST_XMax(e)::float8 AS max_x, ST_YMax(e)::float8 AS max_y, \
                band_kind, bands::int4 AS bands, priority::int4 AS priority, \
                acquired_at, nodata::float8 AS nodata, mask, \
                min_zoom::int2 AS min_zoom, max_zoom::int2 AS max_zoom \
         FROM (SELECT *, Box2D(ST_Transform(geom, 4326)) AS e FROM {table}) AS f"
    )
}

fn descriptor_from_row(row: &PgRow) -> Result<SourceDescriptor, CatalogError> {
    let id: String = get(row, "id", "?")?;

    let srs_text: String = get(row, "srs", &id)?;
    let srs: SpatialRef = srs_text.parse().map_err(|e: crate::coord::ProjectionError| {
        CatalogError::Invalid {
            id: id.clone(),
            reason: e.to_string(),
        }
    })?;

    let band_kind = match get::<Option<String>>(row, "band_kind", &id)? {
        Some(kind) => kind.parse::<BandKind>().map_err(|reason| CatalogError::Invalid {
            id: id.clone(),
            reason,
        })?,
        None => BandKind::default(),
    };

    let bands = get::<Option<i32>>(row, "bands", &id)?.unwrap_or(1);
    let min_zoom = get::<Option<i16>>(row, "min_zoom", &id)?;
    let max_zoom = get::<Option<i16>>(row, "max_zoom", &id)?;

    Ok(SourceDescriptor {
        location: get(row, "location", &id)?,
        srs,
        resolution: get(row, "resolution", &id)?,
        extent: GeoBBox::wgs84(
            get(row, "min_x", &id)?,
            get(row, "min_y", &id)?,
            get(row, "max_x", &id)?,
            get(row, "max_y", &id)?,
        ),
        band_kind,
        bands: u16::try_from(bands).unwrap_or(0),
        priority: get::<Option<i32>>(row, "priority", &id)?.unwrap_or(0),
        acquired_at: get::<Option<DateTime<Utc>>>(row, "acquired_at", &id)?,
        nodata: get(row, "nodata", &id)?,
        mask: get(row, "mask", &id)?,
        min_zoom: min_zoom.and_then(|z| u8::try_from(z).ok()),
        max_zoom: max_zoom.and_then(|z| u8::try_from(z).ok()),
        id,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str, id: &str) -> Result<T, CatalogError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| CatalogError::Invalid {
        id: id.to_string(),
        reason: format!("column {}: {}", column, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("footprints"));
        assert!(is_valid_table_name("elevation.footprints"));
        assert!(!is_valid_table_name("footprints; DROP TABLE x"));
        assert!(!is_valid_table_name("1table"));
        assert!(!is_valid_table_name(""));
    }

    #[test]
    fn test_query_targets_table() {
        let query = footprint_query("elevation.footprints");
        assert!(query.contains("FROM elevation.footprints"));
        assert!(query.contains("ST_Transform(geom, 4326)"));
    }

    #[tokio::test]
    async fn test_rejects_invalid_table_before_connecting() {
        let config = PostgisConfig::new("postgres://localhost/elevation").with_table("x y");
        assert!(matches!(
            PostgisCatalogLoader::new(&config),
            Err(CatalogError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_database_is_unavailable() {
        let config = PostgisConfig::new("postgres://tilecutter@127.0.0.1:1/elevation")
            .with_acquire_timeout(Duration::from_millis(200));
        let loader = PostgisCatalogLoader::new(&config).unwrap();
        assert!(matches!(
            loader.load().await,
            Err(CatalogError::Unavailable(_))
        ));
    }
}
