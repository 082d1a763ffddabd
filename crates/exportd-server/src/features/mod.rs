//! Feature modules implementing the export API
//!
//! Each feature is a vertical slice with its own commands (write
//! operations), queries (read operations), and routes. Handlers are thin;
//! the work happens in the per-operation `handle` functions so they can
//! be exercised without HTTP framing.

pub mod exports;
pub mod shared;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::json;

use crate::config::ExportConfig;
use crate::export::pipeline::PipelineContext;
use crate::export::registry::JobRegistry;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// PostgreSQL connection pool
    pub db: sqlx::PgPool,
    /// In-process export job registry
    pub registry: Arc<JobRegistry>,
    /// Artifact directory, batch size, and concurrency settings
    pub export: Arc<ExportConfig>,
}

impl FeatureState {
    pub fn new(db: sqlx::PgPool, export: ExportConfig) -> Self {
        Self {
            db,
            registry: Arc::new(JobRegistry::new()),
            export: Arc::new(export),
        }
    }

    /// The slice of state a spawned pipeline task needs
    pub fn pipeline_context(&self) -> PipelineContext {
        PipelineContext {
            db: self.db.clone(),
            registry: self.registry.clone(),
            storage_path: self.export.storage_path.clone(),
            batch_size: self.export.batch_size,
        }
    }
}

/// Creates the API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .route("/health", get(health_check))
        .nest("/exports", exports::exports_routes())
        .with_state(state)
}

/// Liveness probe
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
