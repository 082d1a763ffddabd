//! Export job data model.
//!
//! Jobs live only in the in-process registry; a restart loses them. The
//! artifact files on disk survive, but nothing re-associates them with
//! job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::encoder::Dialect;

/// Columns of the `users` table that may be exported, in default export
/// order, with the SQL type each one decodes as.
pub const ALLOWED_COLUMNS: &[(&str, ColumnKind)] = &[
    ("id", ColumnKind::BigInt),
    ("name", ColumnKind::Text),
    ("email", ColumnKind::Text),
    ("signup_date", ColumnKind::Timestamp),
    ("country_code", ColumnKind::Text),
    ("subscription_tier", ColumnKind::Text),
    ("lifetime_value", ColumnKind::Double),
];

/// How a column's value decodes from a Postgres row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    BigInt,
    Text,
    Timestamp,
    Double,
}

/// Look up the decode kind for an allow-listed column name
pub fn column_kind(name: &str) -> Option<ColumnKind> {
    ALLOWED_COLUMNS
        .iter()
        .find(|(col, _)| *col == name)
        .map(|(_, kind)| *kind)
}

/// Default column projection: every allow-listed column, in order
pub fn default_columns() -> Vec<String> {
    ALLOWED_COLUMNS
        .iter()
        .map(|(name, _)| (*name).to_string())
        .collect()
}

/// Subscription tier of a user row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Premium,
    Enterprise,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Enterprise => "enterprise",
        }
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SubscriptionTier::Free),
            "basic" => Ok(SubscriptionTier::Basic),
            "premium" => Ok(SubscriptionTier::Premium),
            "enterprise" => Ok(SubscriptionTier::Enterprise),
            other => Err(format!("unknown subscription tier '{}'", other)),
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized row filters. Absent predicates contribute no SQL clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportFilters {
    /// Exactly two uppercase ASCII letters
    pub country_code: Option<String>,
    pub subscription_tier: Option<SubscriptionTier>,
    /// Non-negative, finite
    pub min_ltv: Option<f64>,
}

impl ExportFilters {
    pub fn is_empty(&self) -> bool {
        self.country_code.is_none() && self.subscription_tier.is_none() && self.min_ltv.is_none()
    }
}

/// Everything the pipeline needs to produce one artifact
#[derive(Debug, Clone)]
pub struct ExportSpec {
    pub filters: ExportFilters,
    /// Validated, duplicate-free subset of [`ALLOWED_COLUMNS`], in output order
    pub columns: Vec<String>,
    pub dialect: Dialect,
}

/// Job lifecycle states.
///
/// Transitions only move forward: pending -> processing -> completed, with
/// failed and cancelled reachable from either non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ExportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportStatus::Completed | ExportStatus::Failed | ExportStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Processing => "processing",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
            ExportStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress counters published by the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total_rows: i64,
    pub processed_rows: i64,
    pub percentage: u8,
}

impl Progress {
    /// `round(processed * 100 / total)` when total > 0, else 0
    pub fn new(processed: i64, total: i64) -> Self {
        let percentage = if total > 0 {
            ((processed as f64 * 100.0) / total as f64).round() as u8
        } else {
            0
        };
        Self {
            total_rows: total,
            processed_rows: processed,
            percentage,
        }
    }
}

/// One export request and its state
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub id: Uuid,
    pub status: ExportStatus,
    pub spec: ExportSpec,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// Set on any terminal transition
    pub completed_at: Option<DateTime<Utc>>,
    /// Populated iff status is `failed`
    pub error: Option<String>,
    /// Populated iff status is `completed`
    pub file_path: Option<PathBuf>,
}

impl ExportJob {
    pub fn new(id: Uuid, spec: ExportSpec) -> Self {
        Self {
            id,
            status: ExportStatus::Pending,
            spec,
            progress: Progress::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            file_path: None,
        }
    }
}
