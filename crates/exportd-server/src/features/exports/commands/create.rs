use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::export::encoder::{Dialect, DialectError};
use crate::export::model::{default_columns, ExportFilters, ExportSpec, ExportStatus};
use crate::export::pipeline;
use crate::features::shared::validation::{
    validate_columns, validate_country_code, validate_min_ltv, validate_tier, ColumnsError,
    CountryCodeError, MinLtvError, TierError,
};
use crate::features::FeatureState;

/// Raw initiate parameters, exactly as they arrive on the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateExportCommand {
    pub country_code: Option<String>,
    pub subscription_tier: Option<String>,
    pub min_ltv: Option<String>,
    pub columns: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "quoteChar")]
    pub quote_char: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExportResponse {
    pub export_id: Uuid,
    pub status: ExportStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateExportError {
    #[error("{0}")]
    CountryCode(#[from] CountryCodeError),
    #[error("{0}")]
    Tier(#[from] TierError),
    #[error("{0}")]
    MinLtv(#[from] MinLtvError),
    #[error("{0}")]
    Columns(#[from] ColumnsError),
    #[error("{0}")]
    Dialect(#[from] DialectError),
}

impl CreateExportCommand {
    /// Validate every parameter and produce the normalized export spec
    pub fn validate(&self) -> Result<ExportSpec, CreateExportError> {
        let mut filters = ExportFilters::default();

        if let Some(ref code) = self.country_code {
            filters.country_code = Some(validate_country_code(code)?);
        }
        if let Some(ref tier) = self.subscription_tier {
            filters.subscription_tier = Some(validate_tier(tier)?);
        }
        if let Some(ref min_ltv) = self.min_ltv {
            filters.min_ltv = Some(validate_min_ltv(min_ltv)?);
        }

        let columns = match self.columns {
            Some(ref raw) => validate_columns(raw)?,
            None => default_columns(),
        };

        let dialect = Dialect::new(
            self.delimiter.as_deref().unwrap_or(","),
            self.quote_char.as_deref().unwrap_or("\""),
        )?;

        Ok(ExportSpec {
            filters,
            columns,
            dialect,
        })
    }
}

/// Initiate an export: allocate the job and hand it to a pipeline task.
///
/// The response goes out before the pipeline touches the database; the
/// job starts `pending` and advances in the background.
#[tracing::instrument(skip(state, command))]
pub async fn handle(
    state: FeatureState,
    command: CreateExportCommand,
) -> Result<CreateExportResponse, CreateExportError> {
    let spec = command.validate()?;

    let active = state.registry.active_count();
    if active >= state.export.max_active_jobs {
        // Soft cap: advisory only, the job is admitted anyway
        tracing::warn!(
            active,
            cap = state.export.max_active_jobs,
            "Active export count exceeds the configured soft cap"
        );
    }

    let export_id = state.registry.create(spec.clone());
    tokio::spawn(pipeline::run(state.pipeline_context(), export_id, spec));

    tracing::info!(export_id = %export_id, "Export job created");

    Ok(CreateExportResponse {
        export_id,
        status: ExportStatus::Pending,
    })
}
