use std::time::Duration;
use uuid::Uuid;

use crate::export::model::ExportStatus;
use crate::export::pipeline;
use crate::features::FeatureState;

/// How long to wait before the backstop removal of a cancelled job's
/// artifact. Gives the pipeline time to release the file first.
const CLEANUP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct CancelExportCommand {
    pub export_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum CancelExportError {
    #[error("Export not found")]
    NotFound,
    #[error("Export is {0} and can no longer be cancelled")]
    NotCancellable(ExportStatus),
}

/// Cancel an export.
///
/// The transition is synchronous; the running pipeline notices at its
/// next batch boundary and removes the partial artifact itself. A
/// deferred removal backs that up in case the pipeline already exited.
#[tracing::instrument(skip(state), fields(export_id = %command.export_id))]
pub async fn handle(state: FeatureState, command: CancelExportCommand) -> Result<(), CancelExportError> {
    let job = state
        .registry
        .get(command.export_id)
        .ok_or(CancelExportError::NotFound)?;

    if !state.registry.cancel_job(command.export_id) {
        // Re-read: the job may have reached a different terminal state
        // between the lookup and the transition attempt
        let status = state
            .registry
            .get(command.export_id)
            .map(|j| j.status)
            .unwrap_or(job.status);
        return Err(CancelExportError::NotCancellable(status));
    }

    let path = pipeline::artifact_path(&state.export.storage_path, command.export_id);
    tokio::spawn(async move {
        tokio::time::sleep(CLEANUP_GRACE).await;
        pipeline::remove_artifact(&path).await;
    });

    tracing::info!("Export cancelled");
    Ok(())
}
