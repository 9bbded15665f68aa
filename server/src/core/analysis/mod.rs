//! External Analysis Module
//!
//! The detection/tracking engine runs out of process. This module defines the
//! narrow capability the rest of the service depends on ([`AnalysisEngine`]),
//! the request/result contract, and the process-backed implementation.

mod engine;

pub use engine::ProcessAnalysisEngine;

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::JobId;

// =============================================================================
// Errors
// =============================================================================

/// Analysis invocation failures
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The engine binary could not be started at all.
    #[error("Failed to launch analysis process `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine exited unsuccessfully. `code` is `None` when it was killed by a signal.
    #[error("Analysis process failed with exit code {}", display_code(.code))]
    ProcessFailed { code: Option<i32>, stderr: String },

    /// The engine exited successfully but did not print a valid result.
    #[error("Analysis result contract violated: {reason}")]
    ContractViolation { reason: String, raw: String },

    /// Reading from or waiting on the child failed.
    #[error("Analysis process IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none (terminated by signal)".to_string())
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

// =============================================================================
// Request / Result Contract
// =============================================================================

/// Parameters of one analysis run. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct JobRequest {
    /// Correlation id for logs
    pub job_id: JobId,
    /// Video to analyze
    pub source_video: PathBuf,
    /// Model weights for the detector
    pub model_weights: PathBuf,
    /// Directory the engine writes its output video into
    pub output_directory: PathBuf,
    /// Inference image size
    pub image_size: u32,
    /// Process every Nth frame
    pub frame_skip: u32,
    /// Detection confidence threshold
    pub confidence: Option<f32>,
    /// Frame cap
    pub max_frames: Option<u64>,
    /// Ask the engine to write an annotated video
    pub save_video: bool,
}

impl JobRequest {
    /// Fixed, ordered engine argument list.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--video".into(),
            self.source_video.clone().into(),
            "--weights".into(),
            self.model_weights.clone().into(),
            "--outdir".into(),
            self.output_directory.clone().into(),
            "--imgsz".into(),
            self.image_size.to_string().into(),
            "--skip".into(),
            self.frame_skip.to_string().into(),
        ];
        if let Some(conf) = self.confidence {
            args.push("--conf".into());
            args.push(conf.to_string().into());
        }
        if let Some(max_frames) = self.max_frames {
            args.push("--max-frames".into());
            args.push(max_frames.to_string().into());
        }
        if self.save_video {
            args.push("--save-video".into());
        }
        args
    }
}

/// Structured result printed by the engine on stdout.
///
/// Only the output video path is interpreted; everything else (frame counts,
/// timings, per-frame detections with track ids) is carried verbatim.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JobResult {
    payload: serde_json::Map<String, serde_json::Value>,
}

/// Keys accepted for the declared output video path
const OUTPUT_VIDEO_KEYS: [&str; 2] = ["output_video", "outputVideo"];

impl JobResult {
    /// Parses engine stdout. The whole (trimmed) text must be one JSON object,
    /// and a present output path key must hold a string or null.
    pub fn parse(stdout: &str) -> Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(stdout.trim())
            .map_err(|e| format!("stdout is not valid JSON: {e}"))?;

        let serde_json::Value::Object(payload) = value else {
            return Err("stdout JSON is not an object".to_string());
        };

        for key in OUTPUT_VIDEO_KEYS {
            match payload.get(key) {
                None | Some(serde_json::Value::Null) | Some(serde_json::Value::String(_)) => {}
                Some(other) => {
                    return Err(format!("`{key}` must be a path string, got {other}"));
                }
            }
        }

        Ok(Self { payload })
    }

    /// Declared raw output path, if the engine wrote a video.
    pub fn output_video(&self) -> Option<&str> {
        OUTPUT_VIDEO_KEYS
            .iter()
            .find_map(|key| self.payload.get(*key).and_then(|v| v.as_str()))
            .filter(|path| !path.trim().is_empty())
    }

    /// Number of frames the engine reported processing.
    pub fn total_frames(&self) -> Option<u64> {
        self.payload.get("total_frames").and_then(|v| v.as_u64())
    }

    /// Full payload as returned to clients
    pub fn payload(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.payload
    }

    pub fn into_payload(self) -> serde_json::Map<String, serde_json::Value> {
        self.payload
    }
}

// =============================================================================
// Engine Capability
// =============================================================================

/// The out-of-process detection/tracking engine.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Runs one analysis to completion.
    async fn invoke(&self, request: &JobRequest) -> AnalysisResult<JobResult>;
}
