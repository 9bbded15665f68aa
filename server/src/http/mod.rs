//! HTTP Surface
//!
//! axum router exposing job submission, artifact delivery and the frontend
//! entry document.

mod jobs;
mod media;
pub mod range;

#[cfg(test)]
mod tests_destructive;

pub use jobs::{TrackRequest, UPLOAD_FIELD};

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::warn;

use crate::core::jobs::JobOrchestrator;
use crate::core::transcode::EncoderInfo;

/// Shared state of all handlers
pub struct AppState {
    pub orchestrator: JobOrchestrator,
    /// Encoder detected at startup, reported by `/health`
    pub encoder: Option<EncoderInfo>,
}

impl AppState {
    pub fn new(orchestrator: JobOrchestrator, encoder: Option<EncoderInfo>) -> Self {
        Self {
            orchestrator,
            encoder,
        }
    }
}

/// Builds the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let settings = state.orchestrator.settings();
    let body_limit = settings.limits.max_upload_bytes;
    let static_dir = ServeDir::new(&settings.paths.static_dir);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/upload", post(jobs::upload_video))
        .route("/track", post(jobs::track_video))
        .route("/video/{name}", get(media::stream_video))
        .route("/download/{name}", get(media::download_video))
        .fallback_service(static_dir)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /
async fn index(State(state): State<Arc<AppState>>) -> Response {
    let path = state
        .orchestrator
        .settings()
        .paths
        .static_dir
        .join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(path = %path.display(), "Frontend entry document unavailable: {}", e);
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Frontend not found" })),
            )
                .into_response()
        }
    }
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "encoder": state.encoder,
    }))
}
