//! Artifact delivery: range-aware streaming and forced downloads.

use std::io::SeekFrom;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use super::range::{parse_range, unsatisfied_content_range};
use super::AppState;
use crate::core::jobs::encode_path_segment;
use crate::core::store::{Artifact, StoreError};

/// Headers sent with every stream response, including 416s.
fn playback_headers() -> [(HeaderName, &'static str); 4] {
    [
        (header::ACCEPT_RANGES, "bytes"),
        (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        (header::PRAGMA, "no-cache"),
        (header::EXPIRES, "0"),
    ]
}

/// GET /video/{name}
pub async fn stream_video(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let artifact = match find_artifact(&state, &name).await {
        Ok(artifact) => artifact,
        Err(response) => return response,
    };

    let Some(range_header) = headers.get(header::RANGE) else {
        debug!(name = %artifact.name, size = artifact.size, "Streaming full artifact");
        return match file_body(&artifact.path, 0, artifact.size).await {
            Ok(body) => (
                StatusCode::OK,
                playback_headers(),
                [
                    (header::CONTENT_TYPE, artifact.mime.to_string()),
                    (header::CONTENT_LENGTH, artifact.size.to_string()),
                ],
                body,
            )
                .into_response(),
            Err(e) => read_failure(&artifact, e),
        };
    };

    let parsed = range_header
        .to_str()
        .map_err(|_| ())
        .and_then(|value| parse_range(value, artifact.size).map_err(|_| ()));
    let Ok(range) = parsed else {
        debug!(name = %artifact.name, range = ?range_header, "Rejecting range");
        return (
            StatusCode::RANGE_NOT_SATISFIABLE,
            playback_headers(),
            [(header::CONTENT_RANGE, unsatisfied_content_range(artifact.size))],
            Json(json!({ "error": "Requested range not satisfiable" })),
        )
            .into_response();
    };

    debug!(name = %artifact.name, range = %range.content_range(), "Streaming partial artifact");
    match file_body(&artifact.path, range.start, range.len()).await {
        Ok(body) => (
            StatusCode::PARTIAL_CONTENT,
            playback_headers(),
            [
                (header::CONTENT_TYPE, artifact.mime.to_string()),
                (header::CONTENT_LENGTH, range.len().to_string()),
                (header::CONTENT_RANGE, range.content_range()),
            ],
            body,
        )
            .into_response(),
        Err(e) => read_failure(&artifact, e),
    }
}

/// GET /download/{name}
pub async fn download_video(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    let artifact = match find_artifact(&state, &name).await {
        Ok(artifact) => artifact,
        Err(response) => return response,
    };

    match file_body(&artifact.path, 0, artifact.size).await {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, artifact.mime.to_string()),
                (header::CONTENT_LENGTH, artifact.size.to_string()),
                (header::CONTENT_DISPOSITION, attachment_disposition(&artifact.name)),
            ],
            body,
        )
            .into_response(),
        Err(e) => read_failure(&artifact, e),
    }
}

async fn find_artifact(state: &AppState, name: &str) -> Result<Artifact, Response> {
    match state.orchestrator.store().lookup(name).await {
        Ok(artifact) => Ok(artifact),
        Err(StoreError::InvalidName(_)) | Err(StoreError::NotFound(_)) => {
            debug!(name = %name, "Artifact not found");
            Err((
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Video not found" })),
            )
                .into_response())
        }
        Err(StoreError::Io(e)) => {
            error!(name = %name, "Artifact lookup failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to read video" })),
            )
                .into_response())
        }
    }
}

/// Streams `len` bytes starting at `start` without buffering the file.
async fn file_body(path: &FsPath, start: u64, len: u64) -> std::io::Result<Body> {
    let mut file = tokio::fs::File::open(path).await?;
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    Ok(Body::from_stream(ReaderStream::new(file.take(len))))
}

fn read_failure(artifact: &Artifact, err: std::io::Error) -> Response {
    error!(path = %artifact.path.display(), "Failed to open artifact: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Failed to read video" })),
    )
        .into_response()
}

/// `attachment` disposition with an ASCII fallback name and the exact name as `filename*`.
fn attachment_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if fallback == name {
        format!("attachment; filename=\"{name}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            encode_path_segment(name)
        )
    }
}
