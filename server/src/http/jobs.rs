//! Job submission routes: multipart upload and path reference.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        rejection::JsonRejection,
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use super::AppState;
use crate::core::analysis::AnalysisError;
use crate::core::jobs::{JobError, VideoSource};

/// Multipart field carrying the video
pub const UPLOAD_FIELD: &str = "video";

/// Body of `POST /track`
#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    #[serde(default)]
    pub video: Option<String>,
}

/// Status, message and extra diagnostic keys for a failed job.
struct Failure {
    status: StatusCode,
    message: String,
    details: Map<String, Value>,
}

impl From<&JobError> for Failure {
    fn from(err: &JobError) -> Self {
        let mut details = Map::new();
        let (status, message) = match err {
            err if err.is_client_error() => (StatusCode::BAD_REQUEST, err.to_string()),
            JobError::Analysis(AnalysisError::Launch { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            JobError::Analysis(AnalysisError::ProcessFailed { code, stderr }) => {
                details.insert("code".into(), json!(code));
                details.insert("stderr".into(), json!(stderr));
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Tracking process failed".to_string(),
                )
            }
            JobError::Analysis(AnalysisError::ContractViolation { reason, raw }) => {
                details.insert("code".into(), json!(0));
                details.insert("raw".into(), json!(raw));
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to parse tracking results: {reason}"),
                )
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        Self {
            status,
            message,
            details,
        }
    }
}

// =============================================================================
// POST /upload
// =============================================================================

fn upload_error(
    status: StatusCode,
    message: impl Into<String>,
    details: Map<String, Value>,
) -> Response {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(false));
    body.insert("error".into(), Value::String(message.into()));
    body.extend(details);
    (status, Json(Value::Object(body))).into_response()
}

/// POST /upload
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            return upload_error(StatusCode::BAD_REQUEST, rejection.body_text(), Map::new())
        }
    };

    let upload = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(UPLOAD_FIELD) => {
                let path = state.orchestrator.prepare_upload(field.file_name());
                let stored = store_field(field, &path).await;
                break stored.map(|size| (path, size));
            }
            Ok(Some(_)) => continue,
            Ok(None) => {
                return upload_error(
                    StatusCode::BAD_REQUEST,
                    "No video file uploaded",
                    Map::new(),
                )
            }
            Err(e) => return upload_error(e.status(), e.body_text(), Map::new()),
        }
    };

    let path = match upload {
        Ok((path, 0)) => {
            discard_partial_upload(&path).await;
            return upload_error(
                StatusCode::BAD_REQUEST,
                "No video file uploaded",
                Map::new(),
            );
        }
        Ok((path, size)) => {
            info!(path = %path.display(), size = size, "Upload stored");
            path
        }
        Err(response) => return response,
    };

    match state.orchestrator.run(VideoSource::Upload(path)).await {
        Ok(outcome) => Json(json!({
            "success": true,
            "filename": outcome.file_name,
            "stream_url": outcome.stream_url,
            "trackingResults": outcome.result,
        }))
        .into_response(),
        Err(err) => {
            let failure = Failure::from(&err);
            upload_error(failure.status, failure.message, failure.details)
        }
    }
}

/// Writes one multipart field to `path` chunk by chunk.
async fn store_field(mut field: Field<'_>, path: &Path) -> Result<u64, Response> {
    let mut file = tokio::fs::File::create(path).await.map_err(|e| {
        error!(path = %path.display(), "Failed to create upload file: {}", e);
        upload_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to store upload: {e}"),
            Map::new(),
        )
    })?;

    let mut written = 0u64;
    let result: Result<(), Response> = async {
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    file.write_all(&chunk).await.map_err(|e| {
                        upload_error(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            format!("Failed to store upload: {e}"),
                            Map::new(),
                        )
                    })?;
                    written += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(e) => return Err(upload_error(e.status(), e.body_text(), Map::new())),
            }
        }
        file.flush().await.map_err(|e| {
            upload_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to store upload: {e}"),
                Map::new(),
            )
        })
    }
    .await;

    if let Err(response) = result {
        discard_partial_upload(path).await;
        return Err(response);
    }
    Ok(written)
}

async fn discard_partial_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), "Failed to remove partial upload: {}", e);
    }
}

// =============================================================================
// POST /track
// =============================================================================

fn track_error(
    status: StatusCode,
    message: impl Into<String>,
    details: Map<String, Value>,
) -> Response {
    let mut body = Map::new();
    body.insert("status".into(), Value::String("error".into()));
    body.insert("message".into(), Value::String(message.into()));
    body.extend(details);
    (status, Json(Value::Object(body))).into_response()
}

/// POST /track
pub async fn track_video(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TrackRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return track_error(StatusCode::BAD_REQUEST, rejection.body_text(), Map::new())
        }
    };
    let Some(video) = request.video.filter(|v| !v.trim().is_empty()) else {
        return track_error(
            StatusCode::BAD_REQUEST,
            "No video path provided",
            Map::new(),
        );
    };

    match state.orchestrator.run(VideoSource::Reference(video)).await {
        Ok(outcome) => {
            let mut body = outcome.result.into_payload();
            body.insert("status".into(), Value::String("success".into()));
            if let Some(path) = outcome.artifact_path.as_deref() {
                body.insert(
                    "output_video".into(),
                    Value::String(path.to_string_lossy().into_owned()),
                );
            }
            body.insert("stream_url".into(), json!(outcome.stream_url));
            Json(Value::Object(body)).into_response()
        }
        Err(err) => {
            let failure = Failure::from(&err);
            track_error(failure.status, failure.message, failure.details)
        }
    }
}
