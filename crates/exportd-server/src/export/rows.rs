//! Paged row source over the filtered `users` table.
//!
//! The source owns one pooled connection for its whole lifetime and
//! streams the projected SELECT through Postgres' forward-only
//! extended-protocol portal, so the result set is never materialized
//! server- or client-side. Rows are rendered to canonical text as they
//! arrive and handed over in `batch_size` chunks through a bounded
//! channel of capacity 1: at most one rendered batch is ever in flight.
//!
//! Dropping the source (normal end, cancellation, or error) closes the
//! portal and returns the connection to the pool.
//!
//! Filter values always bind as query parameters; only allow-listed
//! column identifiers reach the SQL text.

use chrono::{DateTime, SecondsFormat, Utc};
use futures::TryStreamExt;
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row};
use thiserror::Error;
use tokio::sync::mpsc;

use super::encoder::ExportRecord;
use super::model::{column_kind, ColumnKind, ExportFilters, ExportSpec};

#[derive(Debug, Error)]
pub enum RowSourceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Filtered row count, used for progress accounting before streaming
pub async fn count_rows(pool: &PgPool, filters: &ExportFilters) -> Result<i64, RowSourceError> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
    push_filters(&mut qb, filters);
    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count)
}

/// Append the AND-combined WHERE clause for the present predicates
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &ExportFilters) {
    let mut prefix = " WHERE ";
    if let Some(ref country) = filters.country_code {
        qb.push(prefix).push("country_code = ").push_bind(country.clone());
        prefix = " AND ";
    }
    if let Some(tier) = filters.subscription_tier {
        qb.push(prefix)
            .push("subscription_tier = ")
            .push_bind(tier.as_str());
        prefix = " AND ";
    }
    if let Some(min_ltv) = filters.min_ltv {
        qb.push(prefix).push("lifetime_value >= ").push_bind(min_ltv);
    }
}

/// The projected, filtered SELECT. Column names are allow-listed upstream.
fn select_query<'q>(columns: &[String], filters: &ExportFilters) -> QueryBuilder<'q, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(column.as_str());
    }
    qb.push(" FROM users");
    push_filters(&mut qb, filters);
    qb
}

/// Render one Postgres row into column -> canonical text
fn render_row(row: &PgRow, columns: &[String]) -> Result<ExportRecord, sqlx::Error> {
    let mut record = ExportRecord::with_capacity(columns.len());
    for column in columns {
        let kind = column_kind(column).unwrap_or(ColumnKind::Text);
        let rendered = match kind {
            ColumnKind::BigInt => row
                .try_get::<Option<i64>, _>(column.as_str())?
                .map(|v| v.to_string()),
            ColumnKind::Double => row
                .try_get::<Option<f64>, _>(column.as_str())?
                .map(|v| v.to_string()),
            ColumnKind::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(column.as_str())?
                .map(|ts| format_timestamp(&ts)),
            ColumnKind::Text => row.try_get::<Option<String>, _>(column.as_str())?,
        };
        record.insert(column.clone(), rendered.unwrap_or_default());
    }
    Ok(record)
}

/// ISO-8601 UTC; fractional seconds only when the source carries them
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Streaming batch iterator over the filtered dataset
pub struct RowSource {
    batches: mpsc::Receiver<Result<Vec<ExportRecord>, RowSourceError>>,
}

impl RowSource {
    /// Acquire a connection and start streaming rows into batches.
    ///
    /// The spawned fetch task ends (and releases the connection) when the
    /// query is exhausted, an error surfaces, or the source is dropped.
    pub async fn open(
        pool: PgPool,
        spec: &ExportSpec,
        batch_size: usize,
    ) -> Result<Self, RowSourceError> {
        let mut conn = pool.acquire().await?;
        let columns = spec.columns.clone();
        let filters = spec.filters.clone();
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut qb = select_query(&columns, &filters);
            let query = qb.build();
            let mut stream = query.fetch(&mut *conn);
            let mut batch: Vec<ExportRecord> = Vec::with_capacity(batch_size);

            loop {
                match stream.try_next().await {
                    Ok(Some(row)) => {
                        match render_row(&row, &columns) {
                            Ok(record) => batch.push(record),
                            Err(e) => {
                                let _ = tx.send(Err(e.into())).await;
                                return;
                            },
                        }
                        if batch.len() >= batch_size {
                            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                            if tx.send(Ok(full)).await.is_err() {
                                // Receiver dropped: consumer is done with us
                                return;
                            }
                        }
                    },
                    Ok(None) => {
                        if !batch.is_empty() {
                            let _ = tx.send(Ok(batch)).await;
                        }
                        return;
                    },
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    },
                }
            }
        });

        Ok(Self { batches: rx })
    }

    /// Next batch of up to `batch_size` records, or `None` when exhausted
    pub async fn next_batch(&mut self) -> Result<Option<Vec<ExportRecord>>, RowSourceError> {
        match self.batches.recv().await {
            Some(Ok(batch)) => Ok(Some(batch)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
