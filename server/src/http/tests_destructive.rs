//! Destructive and Edge Case Tests for the HTTP surface
//!
//! Hostile artifact names and malformed range headers must never escape the
//! outputs directory or produce a 5xx.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use super::{router, AppState};
use crate::core::analysis::{AnalysisEngine, AnalysisResult, JobRequest, JobResult};
use crate::core::jobs::JobOrchestrator;
use crate::core::settings::ServiceSettings;

struct IdleEngine;

#[async_trait]
impl AnalysisEngine for IdleEngine {
    async fn invoke(&self, _request: &JobRequest) -> AnalysisResult<JobResult> {
        Ok(JobResult::parse(r#"{"output_video": null}"#).unwrap())
    }
}

fn app(dir: &TempDir) -> Router {
    let mut settings = ServiceSettings::default();
    settings.paths.project_root = dir.path().to_path_buf();
    settings.transcode.program = "vidtrack-no-such-encoder".to_string();
    let orchestrator =
        JobOrchestrator::new(Arc::new(settings.resolved().unwrap()), Arc::new(IdleEngine))
            .unwrap();
    router(Arc::new(AppState::new(orchestrator, None)))
}

#[tokio::test]
async fn test_destructive_traversal_names() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("secret.txt"), b"top secret").unwrap();
    let app = app(&dir);

    let uris = [
        "/video/..%2Fsecret.txt",
        "/video/%2E%2E%2Fsecret.txt",
        "/video/..%5Csecret.txt",
        "/video/%00",
        "/video/..",
        "/download/..%2Fsecret.txt",
        "/download/%2Fetc%2Fpasswd",
    ];
    for uri in uris {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!body.windows(10).any(|w| w == b"top secret"), "{uri}");
    }
}

#[tokio::test]
async fn test_destructive_range_headers() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("outputs")).unwrap();
    std::fs::write(dir.path().join("outputs/clip.mp4"), [7u8; 64]).unwrap();
    let app = app(&dir);

    let headers = [
        "bytes=64-",
        "bytes=0-64",
        "bytes=--1",
        "bytes=0-1,2-3",
        "bytes=18446744073709551615-",
        "bytes=0-18446744073709551616",
        "frames=0-1",
        "",
    ];
    for value in headers {
        let response = app
            .clone()
            .oneshot(
                Request::get("/video/clip.mp4")
                    .header(header::RANGE, value)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::RANGE_NOT_SATISFIABLE,
            "{value:?}"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */64"
        );
    }
}

#[tokio::test]
async fn test_destructive_non_utf8_range_header() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("outputs")).unwrap();
    std::fs::write(dir.path().join("outputs/clip.mp4"), [1u8; 8]).unwrap();
    let app = app(&dir);

    let response = app
        .oneshot(
            Request::get("/video/clip.mp4")
                .header(
                    header::RANGE,
                    HeaderValue::from_bytes(b"bytes=\xff-\xfe").unwrap(),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_destructive_empty_artifact() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("outputs")).unwrap();
    std::fs::write(dir.path().join("outputs/empty.mp4"), b"").unwrap();
    let app = app(&dir);

    let response = app
        .clone()
        .oneshot(Request::get("/video/empty.mp4").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "0");

    let response = app
        .oneshot(
            Request::get("/video/empty.mp4")
                .header(header::RANGE, "bytes=0-")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_destructive_job_without_output_video() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let response = app
        .oneshot(
            Request::post("/track")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"video": "clip.mp4"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "success");
    assert!(json["stream_url"].is_null());
}
