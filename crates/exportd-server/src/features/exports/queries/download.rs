//! Artifact download: range-capable, optionally gzip-encoded streaming.
//!
//! Gzip applies to the selected byte range of the *uncompressed* file:
//! a ranged gzip response is a self-contained compressed stream over
//! that slice, not a sub-stream of the full file's compressed form.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use flate2::{write::GzEncoder, Compression};
use std::io::Write;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::export::model::ExportStatus;
use crate::features::FeatureState;

/// Compressed chunks are flushed downstream once they reach this size
const GZIP_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct DownloadQuery {
    pub export_id: Uuid,
    /// Raw `Range` header value, if any
    pub range: Option<String>,
    /// Whether `Accept-Encoding` named gzip
    pub accept_gzip: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Export not found")]
    NotFound,
    #[error("Export is {0}. The artifact is available once the export has completed.")]
    NotReady(ExportStatus),
    #[error("Export artifact is missing")]
    ArtifactMissing,
    #[error("Requested range is not satisfiable")]
    RangeNotSatisfiable { file_size: u64 },
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to build response: {0}")]
    Http(#[from] axum::http::Error),
}

/// What a `Range` header resolves to against a concrete file size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeOutcome {
    /// No range requested, or the header used a non-bytes unit
    Full,
    /// Inclusive byte interval within the file
    Slice { start: u64, end: u64 },
    /// Multi-range, suffix form, malformed, or out of bounds
    Unsatisfiable,
}

/// Resolve a single `bytes=START-[END]` range.
///
/// Non-`bytes` units are ignored (full response). Multi-range and
/// suffix-form requests are rejected, as are malformed or out-of-bounds
/// intervals. `END` defaults to, and is clamped at, the last byte.
fn resolve_range(header: Option<&str>, file_size: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::Full;
    };
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };
    if spec.contains(',') {
        return RangeOutcome::Unsatisfiable;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return RangeOutcome::Unsatisfiable;
    };

    let Ok(start) = start.trim().parse::<u64>() else {
        return RangeOutcome::Unsatisfiable;
    };
    let end = match end.trim() {
        "" => file_size.saturating_sub(1),
        raw => match raw.parse::<u64>() {
            Ok(end) => end.min(file_size.saturating_sub(1)),
            Err(_) => return RangeOutcome::Unsatisfiable,
        },
    };

    if start >= file_size || start > end {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Slice { start, end }
}

/// Serve a completed export's artifact
#[tracing::instrument(skip(state), fields(export_id = %query.export_id))]
pub async fn handle(state: FeatureState, query: DownloadQuery) -> Result<Response, DownloadError> {
    let job = state
        .registry
        .get(query.export_id)
        .ok_or(DownloadError::NotFound)?;

    if job.status != ExportStatus::Completed {
        return Err(DownloadError::NotReady(job.status));
    }

    let path = job.file_path.ok_or(DownloadError::ArtifactMissing)?;
    let metadata = match tokio::fs::metadata(&path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DownloadError::ArtifactMissing)
        },
        other => other?,
    };
    let file_size = metadata.len();

    let range = match resolve_range(query.range.as_deref(), file_size) {
        RangeOutcome::Full => None,
        RangeOutcome::Slice { start, end } => Some((start, end)),
        RangeOutcome::Unsatisfiable => {
            return Err(DownloadError::RangeNotSatisfiable { file_size })
        },
    };

    let mut file = File::open(&path).await?;

    let extension = if query.accept_gzip { ".gz" } else { "" };
    let disposition = format!(
        "attachment; filename=\"export_{}.csv{}\"",
        query.export_id, extension
    );

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, "text/csv")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::ACCEPT_RANGES, "bytes");

    let content_length = match range {
        Some((start, end)) => {
            file.seek(SeekFrom::Start(start)).await?;
            builder = builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{file_size}"),
                );
            end - start + 1
        },
        None => {
            builder = builder.status(StatusCode::OK);
            file_size
        },
    };

    let response = if query.accept_gzip {
        let builder = builder.header(header::CONTENT_ENCODING, "gzip");
        let body = match range {
            Some(_) => gzip_body(file.take(content_length)),
            None => gzip_body(file),
        };
        builder.body(body)?
    } else {
        let builder = builder.header(header::CONTENT_LENGTH, content_length);
        let body = match range {
            Some(_) => Body::from_stream(ReaderStream::new(file.take(content_length))),
            None => Body::from_stream(ReaderStream::new(file)),
        };
        builder.body(body)?
    };

    Ok(response)
}

/// Stream a reader through gzip, emitting compressed chunks as they fill
fn gzip_body<R>(reader: R) -> Body
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<u8>, std::io::Error>>(4);

    tokio::spawn(async move {
        let mut reader = reader;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut buf = vec![0u8; GZIP_CHUNK];

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = encoder.write_all(&buf[..n]) {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                    if encoder.get_ref().len() >= GZIP_CHUNK {
                        let chunk = std::mem::take(encoder.get_mut());
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                },
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                },
            }
        }

        match encoder.finish() {
            Ok(tail) => {
                if !tail.is_empty() {
                    let _ = tx.send(Ok(tail)).await;
                }
            },
            Err(e) => {
                let _ = tx.send(Err(e)).await;
            },
        }
    });

    Body::from_stream(ReceiverStream::new(rx))
}
