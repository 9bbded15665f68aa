//! Service Settings
//!
//! Provides the service configuration with:
//! - Schema validation with defaults (every section and field is optional)
//! - Tolerant normalization of out-of-range values
//! - Resolution of relative paths against the project root
//!
//! Storage location: any JSON file passed via `--config` / `VIDTRACK_CONFIG`.
//! Precedence: CLI flags > environment (`PORT`, `HOST`) > settings file > defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::{CoreError, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Port used when neither the settings file nor the environment provides one
pub const DEFAULT_PORT: u16 = 5000;

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Filesystem layout
    #[serde(default)]
    pub paths: PathSettings,

    /// External analysis engine
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Output normalization encoder
    #[serde(default)]
    pub transcode: TranscodeSettings,

    /// Resource limits
    #[serde(default)]
    pub limits: LimitSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            server: ServerSettings::default(),
            paths: PathSettings::default(),
            analysis: AnalysisSettings::default(),
            transcode: TranscodeSettings::default(),
            limits: LimitSettings::default(),
        }
    }
}

impl ServiceSettings {
    /// Loads settings from a JSON file.
    ///
    /// A missing file yields defaults; an unreadable or malformed file is an error
    /// so a typo in the config does not silently start a misconfigured service.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            info!("Settings file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| CoreError::SettingsLoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut settings =
            serde_json::from_str::<ServiceSettings>(&content).map_err(|e| {
                CoreError::SettingsLoadFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;

        if settings.version < SETTINGS_VERSION {
            info!(
                "Migrating settings from version {} to {}",
                settings.version, SETTINGS_VERSION
            );
        }

        settings.normalize();
        Ok(settings)
    }

    /// Applies `PORT` and `HOST` from the environment when they are set and valid.
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) if port != 0 => self.server.port = port,
                _ => warn!("Ignoring invalid PORT value {:?}", port),
            }
        }
        if let Ok(host) = std::env::var("HOST") {
            if !host.trim().is_empty() {
                self.server.host = host.trim().to_string();
            }
        }
    }

    /// Normalizes and clamps settings so the service always starts with valid values.
    ///
    /// Bad values are corrected (with a warning) instead of failing startup.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        if self.server.port == 0 {
            warn!("Port 0 is not allowed, falling back to {}", DEFAULT_PORT);
            self.server.port = DEFAULT_PORT;
        }
        if self.server.host.trim().is_empty() {
            self.server.host = default_host();
        }
        if let Some(base) = &self.server.public_base_url {
            let trimmed = base.trim().trim_end_matches('/');
            self.server.public_base_url = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }

        if self.analysis.image_size == 0 {
            warn!("analysis.imageSize must be positive, using default");
            self.analysis.image_size = default_image_size();
        }
        self.analysis.image_size = self.analysis.image_size.clamp(32, 4096);
        self.analysis.frame_skip = self.analysis.frame_skip.clamp(1, 120);
        if let Some(conf) = self.analysis.confidence {
            self.analysis.confidence = Some(conf.clamp(0.0, 1.0));
        }
        if self.analysis.max_frames == Some(0) {
            self.analysis.max_frames = None;
        }
        if self.analysis.program.trim().is_empty() {
            self.analysis.program = default_analysis_program();
        }

        if self.transcode.program.trim().is_empty() {
            self.transcode.program = default_encoder_program();
        }
        if self.transcode.suffix.trim().is_empty() {
            self.transcode.suffix = default_normalized_suffix();
        }

        self.limits.max_diagnostic_bytes = self.limits.max_diagnostic_bytes.clamp(1024, 16 << 20);
        self.limits.max_upload_bytes = self.limits.max_upload_bytes.max(1 << 20);
    }

    /// Returns a copy whose directory and file paths are absolute, resolving
    /// relative entries against `paths.projectRoot` (itself resolved against the
    /// current directory).
    pub fn resolved(&self) -> CoreResult<Self> {
        let mut out = self.clone();
        let cwd = std::env::current_dir()?;
        let root = resolve_relative_to(&cwd, &self.paths.project_root);

        out.paths.uploads_dir = resolve_relative_to(&root, &self.paths.uploads_dir);
        out.paths.outputs_dir = resolve_relative_to(&root, &self.paths.outputs_dir);
        out.paths.static_dir = resolve_relative_to(&root, &self.paths.static_dir);
        out.paths.log_dir = self
            .paths
            .log_dir
            .as_ref()
            .map(|dir| resolve_relative_to(&root, dir));
        out.analysis.weights = resolve_relative_to(&root, &self.analysis.weights);
        out.paths.project_root = root;
        Ok(out)
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Joins `path` onto `base` unless it is already absolute.
pub fn resolve_relative_to(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

// ============================================================
// Server Settings
// ============================================================

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,

    /// Absolute URL prefix for generated stream URLs (e.g. `http://localhost:5000`).
    /// When unset, stream URLs are root-relative.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// ============================================================
// Path Settings
// ============================================================

/// Filesystem layout; relative entries resolve against `project_root`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathSettings {
    /// Working directory for external processes and base for relative paths
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Where uploaded videos are written
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Artifact store root (engine outputs and normalized artifacts)
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,

    /// Directory holding the frontend entry document (`index.html`)
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Log file directory (platform data dir when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            uploads_dir: default_uploads_dir(),
            outputs_dir: default_outputs_dir(),
            static_dir: default_static_dir(),
            log_dir: None,
        }
    }
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

// ============================================================
// Analysis Settings
// ============================================================

/// External detection/tracking engine invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSettings {
    /// Program to launch (looked up on the project-root-first search path)
    #[serde(default = "default_analysis_program")]
    pub program: String,

    /// Leading arguments, typically the engine script (e.g. `track.py`)
    #[serde(default = "default_analysis_script")]
    pub script: Vec<String>,

    /// Model weights passed to the engine
    #[serde(default = "default_weights")]
    pub weights: PathBuf,

    /// Inference image size (smaller is faster)
    #[serde(default = "default_image_size")]
    pub image_size: u32,

    /// Process every Nth frame
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,

    /// Detection confidence threshold (engine default when unset)
    #[serde(default)]
    pub confidence: Option<f32>,

    /// Stop after this many frames (engine default when unset)
    #[serde(default)]
    pub max_frames: Option<u64>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            program: default_analysis_program(),
            script: default_analysis_script(),
            weights: default_weights(),
            image_size: default_image_size(),
            frame_skip: default_frame_skip(),
            confidence: None,
            max_frames: None,
        }
    }
}

fn default_analysis_program() -> String {
    "python3".to_string()
}

fn default_analysis_script() -> Vec<String> {
    vec!["track.py".to_string()]
}

fn default_weights() -> PathBuf {
    PathBuf::from("best.pt")
}

fn default_image_size() -> u32 {
    416
}

fn default_frame_skip() -> u32 {
    2
}

// ============================================================
// Transcode Settings
// ============================================================

/// Encoder used to normalize engine output into browser-playable MP4
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeSettings {
    /// Encoder program
    #[serde(default = "default_encoder_program")]
    pub program: String,

    /// Suffix appended to the raw output stem for normalized artifacts
    #[serde(default = "default_normalized_suffix")]
    pub suffix: String,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            program: default_encoder_program(),
            suffix: default_normalized_suffix(),
        }
    }
}

fn default_encoder_program() -> String {
    "ffmpeg".to_string()
}

fn default_normalized_suffix() -> String {
    "_h264.mp4".to_string()
}

// ============================================================
// Limit Settings
// ============================================================

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LimitSettings {
    /// Maximum accepted upload body size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Maximum stderr text retained per external process for diagnostics
    #[serde(default = "default_max_diagnostic_bytes")]
    pub max_diagnostic_bytes: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            max_diagnostic_bytes: default_max_diagnostic_bytes(),
        }
    }
}

fn default_max_upload_bytes() -> usize {
    2 << 30 // 2GB
}

fn default_max_diagnostic_bytes() -> usize {
    256 << 10 // 256KB
}
