use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::export::model::{ExportJob, ExportStatus, Progress};
use crate::features::FeatureState;

#[derive(Debug, Clone)]
pub struct GetStatusQuery {
    pub export_id: Uuid,
}

/// Job snapshot as served on the status endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub export_id: Uuid,
    pub status: ExportStatus,
    pub progress: Progress,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ExportJob> for StatusResponse {
    fn from(job: ExportJob) -> Self {
        Self {
            export_id: job.id,
            status: job.status,
            progress: job.progress,
            error: job.error,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GetStatusError {
    #[error("Export not found")]
    NotFound,
}

#[tracing::instrument(skip(state), fields(export_id = %query.export_id))]
pub async fn handle(state: FeatureState, query: GetStatusQuery) -> Result<StatusResponse, GetStatusError> {
    state
        .registry
        .get(query.export_id)
        .map(StatusResponse::from)
        .ok_or(GetStatusError::NotFound)
}
