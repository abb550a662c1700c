//! Mapping render outcomes to HTTP responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::render::{RenderError, RenderedTile};

/// Status code for a failed render.
///
/// | error                | status |
/// |----------------------|--------|
/// | `InvalidRequest`     | 400    |
/// | `CatalogUnavailable` | 503    |
/// | `Cancelled`          | 503    |
/// | everything else      | 500    |
pub fn status_for(error: &RenderError) -> StatusCode {
    match error {
        RenderError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RenderError::CatalogUnavailable(_) | RenderError::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RenderError::RequestTimeout(_)
        | RenderError::NoCoverage { .. }
        | RenderError::Encode(_)
        | RenderError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for RenderError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Tile request failed");
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

/// A successful tile with its caching policy.
pub(super) struct TileResponse {
    pub tile: RenderedTile,
    pub cache_control: HeaderValue,
}

impl IntoResponse for TileResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static(self.tile.content_type)),
                (header::CACHE_CONTROL, self.cache_control),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
            ],
            self.tile.bytes,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::catalog::CatalogError;
    use crate::encode::EncodeError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RenderError::InvalidRequest("bad".into()), 400),
            (RenderError::CatalogUnavailable("down".into()), 503),
            (RenderError::Cancelled, 503),
            (RenderError::RequestTimeout(Duration::from_secs(1)), 500),
            (RenderError::NoCoverage { failed: 2 }, 500),
            (RenderError::Encode(EncodeError::Png("boom".into())), 500),
            (RenderError::Internal("panic".into()), 500),
            (
                CatalogError::Invalid {
                    id: "srtm".into(),
                    reason: "empty footprint".into(),
                }
                .into(),
                500,
            ),
            (CatalogError::Unavailable("down".into()).into(), 503),
        ];
        for (error, expected) in cases {
            assert_eq!(status_for(&error).as_u16(), expected, "{error}");
        }
    }

    #[test]
    fn test_error_response_is_plain_text() {
        let error = RenderError::InvalidRequest("unknown tile format 'jpg'".into());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
