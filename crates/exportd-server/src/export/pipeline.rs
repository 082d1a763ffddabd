//! Export pipeline: produces one CSV artifact per job.
//!
//! One spawned task per export. Rows flow source -> encoder -> buffered
//! file writer; every record write is awaited before the next record is
//! encoded, so in-flight memory stays bounded by one batch plus the
//! encoder's single-record buffer. Cancellation is cooperative and
//! checked at batch boundaries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use uuid::Uuid;

use super::encoder::CsvEncoder;
use super::model::ExportSpec;
use super::registry::JobRegistry;
use super::rows::{count_rows, RowSource, RowSourceError};

/// Everything a pipeline task needs besides the job itself
#[derive(Clone)]
pub struct PipelineContext {
    pub db: PgPool,
    pub registry: Arc<JobRegistry>,
    pub storage_path: PathBuf,
    pub batch_size: usize,
}

#[derive(Debug, Error)]
enum PipelineError {
    #[error("{0}")]
    Rows(#[from] RowSourceError),
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export cancelled")]
    Cancelled,
}

/// Artifact location for a job: `<storage>/<id>.csv`
pub fn artifact_path(storage: &Path, id: Uuid) -> PathBuf {
    storage.join(format!("{id}.csv"))
}

/// Drive one export job to a terminal state.
///
/// Spawned by the initiate command; never panics back into the caller.
#[tracing::instrument(skip(ctx, spec), fields(export_id = %id))]
pub async fn run(ctx: PipelineContext, id: Uuid, spec: ExportSpec) {
    ctx.registry.start_job(id);
    let path = artifact_path(&ctx.storage_path, id);

    match execute(&ctx, id, &spec, &path).await {
        Ok(rows) => {
            tracing::info!(rows, path = %path.display(), "Export completed");
        },
        Err(PipelineError::Cancelled) => {
            remove_artifact(&path).await;
            tracing::info!("Export cancelled, partial artifact removed");
        },
        Err(e) => {
            remove_artifact(&path).await;
            tracing::error!(error = %e, "Export failed");
            ctx.registry.fail_job(id, e.to_string());
        },
    }
}

async fn execute(
    ctx: &PipelineContext,
    id: Uuid,
    spec: &ExportSpec,
    path: &Path,
) -> Result<i64, PipelineError> {
    fs::create_dir_all(&ctx.storage_path).await?;

    let total = count_rows(&ctx.db, &spec.filters).await?;
    ctx.registry.update_progress(id, 0, total);

    let file = fs::File::create(path).await?;
    let mut writer = BufWriter::new(file);
    let mut encoder = CsvEncoder::new(spec.columns.clone(), spec.dialect);
    writer.write_all(encoder.header()).await?;

    if total == 0 {
        if ctx.registry.is_cancelled(id) {
            return Err(PipelineError::Cancelled);
        }
        return finalize(ctx, id, path, writer, 0).await;
    }

    let mut source = RowSource::open(ctx.db.clone(), spec, ctx.batch_size).await?;
    let mut processed: i64 = 0;

    while let Some(batch) = source.next_batch().await? {
        if ctx.registry.is_cancelled(id) {
            // Dropping the source closes the portal and frees the connection
            return Err(PipelineError::Cancelled);
        }
        for record in &batch {
            writer.write_all(encoder.encode(record)).await?;
        }
        processed += batch.len() as i64;
        ctx.registry.update_progress(id, processed, total);
    }

    if ctx.registry.is_cancelled(id) {
        return Err(PipelineError::Cancelled);
    }
    finalize(ctx, id, path, writer, processed).await
}

async fn finalize(
    ctx: &PipelineContext,
    id: Uuid,
    path: &Path,
    mut writer: BufWriter<fs::File>,
    processed: i64,
) -> Result<i64, PipelineError> {
    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    ctx.registry.complete_job(id, path.to_path_buf());
    Ok(processed)
}

/// Best-effort removal of a (partial) artifact; absence is fine
pub async fn remove_artifact(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove artifact");
        }
    }
}
