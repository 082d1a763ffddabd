//! Router-level API tests.
//!
//! These drive the full axum router with `tower::ServiceExt::oneshot`.
//! The connection pool is lazy and never actually connects: every
//! scenario here either fails validation before touching the database or
//! reads from a registry seeded directly by the test.

use std::path::Path;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use uuid::Uuid;

use exportd_server::config::ExportConfig;
use exportd_server::export::encoder::Dialect;
use exportd_server::export::model::{default_columns, ExportFilters, ExportSpec};
use exportd_server::export::registry::JobRegistry;
use exportd_server::features::{self, FeatureState};

fn test_state(storage: &Path) -> FeatureState {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy("postgresql://localhost/exportd_api_tests")
        .expect("valid database url");

    FeatureState::new(
        pool,
        ExportConfig {
            storage_path: storage.to_path_buf(),
            batch_size: 100,
            max_active_jobs: 5,
        },
    )
}

fn app(state: FeatureState) -> Router {
    features::router(state)
}

fn default_spec() -> ExportSpec {
    ExportSpec {
        filters: ExportFilters::default(),
        columns: default_columns(),
        dialect: Dialect::default(),
    }
}

/// Walk a job to `completed` with the given artifact path
fn seed_completed_job(registry: &JobRegistry, artifact: &Path) -> Uuid {
    let id = registry.create(default_spec());
    registry.start_job(id);
    registry.update_progress(id, 1, 1);
    registry.complete_job(id, artifact.to_path_buf());
    id
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(dir.path()));

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_initiate_rejects_bad_country_code() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/exports/csv?country_code=XYZ")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("country_code"));
}

#[tokio::test]
async fn test_initiate_rejects_delimiter_equal_to_quote() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/exports/csv?delimiter=%22")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("delimiter and quote character must differ"));
}

#[tokio::test]
async fn test_initiate_rejects_unknown_column() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/exports/csv?columns=id,password")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "unknown column: password");
}

#[tokio::test]
async fn test_initiate_returns_accepted_with_pending_job() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let registry = state.registry.clone();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/exports/csv?country_code=ZZ")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");

    let id: Uuid = body["exportId"].as_str().unwrap().parse().unwrap();
    assert!(registry.get(id).is_some());
}

#[tokio::test]
async fn test_status_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(dir.path()));

    let response = app
        .clone()
        .oneshot(get(&format!("/exports/{}/status", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A malformed id cannot name a known export either
    let response = app
        .oneshot(get("/exports/not-a-uuid/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_snapshot_shape() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("artifact.csv");
    std::fs::write(&artifact, b"\"id\"\n1\n").unwrap();

    let state = test_state(dir.path());
    let id = seed_completed_job(&state.registry, &artifact);
    let app = app(state);

    let response = app
        .oneshot(get(&format!("/exports/{id}/status")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["exportId"], id.to_string());
    assert_eq!(body["status"], "completed");
    assert_eq!(body["progress"]["percentage"], 100);
    assert!(body["error"].is_null());
    assert!(body["completedAt"].is_string());
    assert!(body["createdAt"].is_string());
}

#[tokio::test]
async fn test_cancel_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/exports/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_then_status_reports_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let registry = state.registry.clone();
    let app = app(state);

    let id = registry.create(default_spec());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/exports/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get(&format!("/exports/{id}/status")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn test_cancel_completed_job_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("done.csv");
    std::fs::write(&artifact, b"\"id\"\n").unwrap();

    let state = test_state(dir.path());
    let id = seed_completed_job(&state.registry, &artifact);
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/exports/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("completed"));
}

#[tokio::test]
async fn test_download_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(test_state(dir.path()));

    let response = app
        .oneshot(get(&format!("/exports/{}/download", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_before_completion() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let registry = state.registry.clone();
    let app = app(state);

    let id = registry.create(default_spec());
    registry.start_job(id);

    let response = app
        .oneshot(get(&format!("/exports/{id}/download")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_EARLY);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Export is processing."));
}

#[tokio::test]
async fn test_download_completed_but_artifact_gone() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let id = seed_completed_job(&state.registry, &dir.path().join("vanished.csv"));
    let app = app(state);

    let response = app
        .oneshot(get(&format!("/exports/{id}/download")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_full_file() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("ten.csv");
    std::fs::write(&artifact, b"abcdefghij").unwrap();

    let state = test_state(dir.path());
    let id = seed_completed_job(&state.registry, &artifact);
    let app = app(state);

    let response = app
        .oneshot(get(&format!("/exports/{id}/download")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"export_{id}.csv\"")
    );
    assert_eq!(body_bytes(response).await, b"abcdefghij");
}

#[tokio::test]
async fn test_download_byte_range() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("ten.csv");
    std::fs::write(&artifact, b"abcdefghij").unwrap();

    let state = test_state(dir.path());
    let id = seed_completed_job(&state.registry, &artifact);
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/exports/{id}/download"))
                .header(header::RANGE, "bytes=2-4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-4/10");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "3");
    assert_eq!(body_bytes(response).await, b"cde");
}

#[tokio::test]
async fn test_download_open_ended_range_returns_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("ten.csv");
    std::fs::write(&artifact, b"abcdefghij").unwrap();

    let state = test_state(dir.path());
    let id = seed_completed_job(&state.registry, &artifact);
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/exports/{id}/download"))
                .header(header::RANGE, "bytes=0-")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-9/10");
    assert_eq!(body_bytes(response).await, b"abcdefghij");
}

#[tokio::test]
async fn test_download_range_past_end_unsatisfiable() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("ten.csv");
    std::fs::write(&artifact, b"abcdefghij").unwrap();

    let state = test_state(dir.path());
    let id = seed_completed_job(&state.registry, &artifact);
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/exports/{id}/download"))
                .header(header::RANGE, "bytes=10-")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */10");
}

#[tokio::test]
async fn test_download_multi_range_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("ten.csv");
    std::fs::write(&artifact, b"abcdefghij").unwrap();

    let state = test_state(dir.path());
    let id = seed_completed_job(&state.registry, &artifact);
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/exports/{id}/download"))
                .header(header::RANGE, "bytes=0-1,3-4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_download_gzip() {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("ten.csv");
    std::fs::write(&artifact, b"abcdefghij").unwrap();

    let state = test_state(dir.path());
    let id = seed_completed_job(&state.registry, &artifact);
    let app = app(state);

    // Presence-based match: "gzip, deflate" triggers gzip
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/exports/{id}/download"))
                .header(header::ACCEPT_ENCODING, "gzip, deflate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"export_{id}.csv.gz\"")
    );

    let compressed = body_bytes(response).await;
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();
    assert_eq!(decompressed, b"abcdefghij");
}

#[tokio::test]
async fn test_download_gzip_range_is_self_contained_stream() {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("ten.csv");
    std::fs::write(&artifact, b"abcdefghij").unwrap();

    let state = test_state(dir.path());
    let id = seed_completed_job(&state.registry, &artifact);
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/exports/{id}/download"))
                .header(header::RANGE, "bytes=2-4")
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-4/10");
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

    // The compressed payload decodes to the uncompressed slice
    let compressed = body_bytes(response).await;
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();
    assert_eq!(decompressed, b"cde");
}
