//! Export routes
//!
//! The five-endpoint surface: initiate, status, download, cancel, and
//! the liveness probe wired in by the top-level router.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use super::commands::{
    cancel::handle as handle_cancel, create::handle as handle_create, CancelExportCommand,
    CancelExportError, CreateExportCommand, CreateExportError,
};
use super::queries::{
    download::handle as handle_download, get_status::handle as handle_get_status, DownloadError,
    DownloadQuery, GetStatusError, GetStatusQuery,
};
use crate::features::FeatureState;

/// Create export routes
pub fn exports_routes() -> Router<FeatureState> {
    Router::new()
        .route("/csv", post(initiate_export))
        .route("/:id/status", get(export_status))
        .route("/:id/download", get(download_export))
        .route("/:id", axum::routing::delete(cancel_export))
}

/// Initiate a CSV export
///
/// POST /exports/csv?country_code=DE&columns=id,email&delimiter=|
#[tracing::instrument(skip(state, params))]
async fn initiate_export(
    State(state): State<FeatureState>,
    Query(params): Query<CreateExportCommand>,
) -> Result<Response, ExportApiError> {
    let response = handle_create(state, params).await?;
    Ok((StatusCode::ACCEPTED, Json(json!(response))).into_response())
}

/// Poll an export's status
///
/// GET /exports/:id/status
#[tracing::instrument(skip(state))]
async fn export_status(
    State(state): State<FeatureState>,
    Path(id): Path<String>,
) -> Result<Response, ExportApiError> {
    let query = GetStatusQuery {
        export_id: parse_export_id(&id)?,
    };
    let snapshot = handle_get_status(state, query).await?;
    Ok((StatusCode::OK, Json(json!(snapshot))).into_response())
}

/// Download a completed export's artifact
///
/// GET /exports/:id/download, honoring `Range` and `Accept-Encoding: gzip`
#[tracing::instrument(skip(state, headers))]
async fn download_export(
    State(state): State<FeatureState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ExportApiError> {
    let query = DownloadQuery {
        export_id: parse_export_id(&id)?,
        range: headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        accept_gzip: headers
            .get(header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("gzip"))
            .unwrap_or(false),
    };
    Ok(handle_download(state, query).await?)
}

/// Cancel an export
///
/// DELETE /exports/:id
#[tracing::instrument(skip(state))]
async fn cancel_export(
    State(state): State<FeatureState>,
    Path(id): Path<String>,
) -> Result<Response, ExportApiError> {
    let command = CancelExportCommand {
        export_id: parse_export_id(&id)?,
    };
    handle_cancel(state, command).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// A path segment that is not a well-formed id cannot name a known export
fn parse_export_id(raw: &str) -> Result<Uuid, ExportApiError> {
    raw.parse().map_err(|_| ExportApiError::UnknownExport)
}

#[derive(Debug)]
enum ExportApiError {
    UnknownExport,
    Create(CreateExportError),
    Status(GetStatusError),
    Cancel(CancelExportError),
    Download(DownloadError),
}

impl From<CreateExportError> for ExportApiError {
    fn from(err: CreateExportError) -> Self {
        Self::Create(err)
    }
}

impl From<GetStatusError> for ExportApiError {
    fn from(err: GetStatusError) -> Self {
        Self::Status(err)
    }
}

impl From<CancelExportError> for ExportApiError {
    fn from(err: CancelExportError) -> Self {
        Self::Cancel(err)
    }
}

impl From<DownloadError> for ExportApiError {
    fn from(err: DownloadError) -> Self {
        Self::Download(err)
    }
}

impl IntoResponse for ExportApiError {
    fn into_response(self) -> Response {
        let error_body = |message: String| Json(json!({ "error": message }));

        match self {
            ExportApiError::UnknownExport => (
                StatusCode::NOT_FOUND,
                error_body("Export not found".to_string()),
            )
                .into_response(),

            ExportApiError::Create(e) => {
                (StatusCode::BAD_REQUEST, error_body(e.to_string())).into_response()
            },

            ExportApiError::Status(GetStatusError::NotFound) => {
                (StatusCode::NOT_FOUND, error_body("Export not found".to_string())).into_response()
            },

            ExportApiError::Cancel(CancelExportError::NotFound) => {
                (StatusCode::NOT_FOUND, error_body("Export not found".to_string())).into_response()
            },
            ExportApiError::Cancel(e @ CancelExportError::NotCancellable(_)) => {
                (StatusCode::BAD_REQUEST, error_body(e.to_string())).into_response()
            },

            ExportApiError::Download(DownloadError::NotFound)
            | ExportApiError::Download(DownloadError::ArtifactMissing) => {
                (StatusCode::NOT_FOUND, error_body("Export not found".to_string())).into_response()
            },
            ExportApiError::Download(e @ DownloadError::NotReady(_)) => {
                (StatusCode::TOO_EARLY, error_body(e.to_string())).into_response()
            },
            ExportApiError::Download(DownloadError::RangeNotSatisfiable { file_size }) => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{file_size}"))],
                error_body("Requested range is not satisfiable".to_string()),
            )
                .into_response(),
            ExportApiError::Download(DownloadError::Io(e)) => {
                tracing::error!("Storage error during download: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("A storage error occurred".to_string()),
                )
                    .into_response()
            },
            ExportApiError::Download(DownloadError::Http(e)) => {
                tracing::error!("Failed to build download response: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("An internal error occurred".to_string()),
                )
                    .into_response()
            },
        }
    }
}
