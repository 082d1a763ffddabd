//! In-process export job registry.
//!
//! Process-local and in-memory: a restart loses all job state. Mutations
//! go through the registry so the state machine is enforced in one place;
//! `DashMap` gives per-job mutual exclusion, and reads return cloned
//! snapshots.

use dashmap::DashMap;
use chrono::Utc;
use std::path::PathBuf;
use uuid::Uuid;

use super::model::{ExportJob, ExportSpec, ExportStatus, Progress};

/// Concurrent registry of export jobs keyed by export id
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, ExportJob>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Allocate a fresh id and insert a `pending` job
    pub fn create(&self, spec: ExportSpec) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.insert(id, ExportJob::new(id, spec));
        id
    }

    /// Snapshot of a job, if known
    pub fn get(&self, id: Uuid) -> Option<ExportJob> {
        self.jobs.get(&id).map(|entry| entry.clone())
    }

    /// Number of jobs currently pending or processing
    pub fn active_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .count()
    }

    /// `pending -> processing`, recording the start time
    pub fn start_job(&self, id: Uuid) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            if job.status == ExportStatus::Pending {
                job.status = ExportStatus::Processing;
                job.started_at = Some(Utc::now());
            } else {
                tracing::warn!(export_id = %id, status = %job.status, "start_job on non-pending job ignored");
            }
        }
    }

    /// Update the progress counters. No-op once the job is terminal.
    pub fn update_progress(&self, id: Uuid, processed: i64, total: i64) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            if job.status.is_terminal() {
                return;
            }
            job.progress = Progress::new(processed, total);
        }
    }

    /// `processing -> completed`, recording the artifact path
    pub fn complete_job(&self, id: Uuid, file_path: PathBuf) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            if job.status != ExportStatus::Processing {
                tracing::warn!(export_id = %id, status = %job.status, "complete_job on non-processing job ignored");
                return;
            }
            job.status = ExportStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.file_path = Some(file_path);
            job.progress = Progress::new(job.progress.total_rows, job.progress.total_rows);
        }
    }

    /// Any non-terminal state -> `failed`, recording the message
    pub fn fail_job(&self, id: Uuid, message: impl Into<String>) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            if job.status.is_terminal() {
                tracing::warn!(export_id = %id, status = %job.status, "fail_job on terminal job ignored");
                return;
            }
            job.status = ExportStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.error = Some(message.into());
        }
    }

    /// `pending|processing -> cancelled`. Returns whether the transition
    /// happened; the running pipeline observes it at its next batch
    /// boundary.
    pub fn cancel_job(&self, id: Uuid) -> bool {
        match self.jobs.get_mut(&id) {
            Some(mut job) if !job.status.is_terminal() => {
                job.status = ExportStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                true
            },
            _ => false,
        }
    }

    /// Cooperative cancellation check used by pipelines at batch boundaries
    pub fn is_cancelled(&self, id: Uuid) -> bool {
        self.jobs
            .get(&id)
            .map(|job| job.status == ExportStatus::Cancelled)
            .unwrap_or(true)
    }
}
