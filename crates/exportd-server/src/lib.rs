//! Export Server Library
//!
//! Asynchronous, memory-bounded CSV export service over a PostgreSQL
//! `users` table.
//!
//! # Overview
//!
//! A client initiates an export with optional filters, column selection,
//! and CSV dialect options; the server answers immediately with a job id
//! while a background pipeline streams matching rows through a CSV
//! encoder onto disk. The finished artifact is served with single-range
//! and on-the-fly gzip support.
//!
//! # Architecture
//!
//! - **[`export`]**: the core subsystems (row source, CSV encoder, job
//!   registry) and the per-job pipeline that ties them together under a
//!   flat memory bound.
//! - **[`features`]**: the HTTP surface as vertical slices (commands,
//!   queries, routes), one `handle` function per operation. Each
//!   operation carries its own error enum; the routes map them to
//!   responses.
//! - **[`config`]** / **[`middleware`]**: environment configuration and
//!   the CORS/tracing layers.
//!
//! Job state is process-local: a restart loses the registry, while
//! artifact files on disk persist.
//!
//! # Framework Stack
//!
//! - **Axum**: web framework
//! - **SQLx**: PostgreSQL driver and connection pool
//! - **Tokio**: async runtime hosting HTTP handlers and export pipelines

pub mod config;
pub mod export;
pub mod features;
pub mod middleware;
