//! Request handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::response::TileResponse;
use super::AppState;
use crate::render::{parse_bands, RenderError, RenderRequest};
use crate::telemetry::MetricsSnapshot;

#[derive(Debug, Default, Deserialize)]
pub(super) struct TileQuery {
    /// Comma-separated, one-based band numbers.
    bands: Option<String>,
}

/// `GET /{z}/{x}/{y}.{ext}`
pub(super) async fn tile(
    State(state): State<AppState>,
    Path((z, x, file)): Path<(String, String, String)>,
    Query(query): Query<TileQuery>,
) -> Result<TileResponse, RenderError> {
    let mut request = RenderRequest::parse(&format!("{z}/{x}/{file}"))?;
    if let Some(bands) = query.bands.as_deref() {
        request = request.with_bands(parse_bands(bands)?);
    }

    // Dropped with this future when the client goes away.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let tile = state.renderer.render_with_cancel(&request, cancel).await?;
    Ok(TileResponse {
        tile,
        cache_control: state.cache_control.clone(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub catalog_loaded: bool,
    pub sources: usize,
    pub catalog_loaded_at: Option<DateTime<Utc>>,
    pub version: &'static str,
    pub metrics: MetricsSnapshot,
}

/// `GET /health`: 200 once a catalog snapshot is served, 503 before.
pub(super) async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.renderer.catalog().snapshot();
    let report = HealthReport {
        status: if snapshot.is_some() { "ok" } else { "unavailable" },
        catalog_loaded: snapshot.is_some(),
        sources: snapshot.as_ref().map_or(0, |s| s.len()),
        catalog_loaded_at: snapshot.as_ref().map(|s| s.loaded_at()),
        version: crate::VERSION,
        metrics: state.renderer.metrics_snapshot(),
    };
    let status = if report.catalog_loaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
