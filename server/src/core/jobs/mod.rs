//! Job Orchestration Module
//!
//! One job = one analysis run followed by normalization of its output video.
//! Jobs are not queued or persisted: each runs in its own task and the caller
//! awaits the outcome.
//!
//! The engine writes into a scratch directory of its own below the store, so
//! engines that always use the same output file name cannot clobber each
//! other. Its output is then moved to `<source stem>_tracked.<ext>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::analysis::{
    AnalysisEngine, AnalysisError, JobRequest, JobResult, ProcessAnalysisEngine,
};
use crate::core::settings::{resolve_relative_to, ServiceSettings};
use crate::core::store::{sanitize_file_name, ArtifactStore};
use crate::core::transcode::Transcoder;
use crate::core::{new_job_id, ArtifactName, CoreResult, JobId};

/// Fallback stored name for uploads without a usable file name
const DEFAULT_UPLOAD_NAME: &str = "upload.mp4";

/// Inserted between the source stem and the extension of tracked outputs
const TRACKED_SUFFIX: &str = "_tracked";

/// Prefix of per-job scratch directories inside the store
const SCRATCH_PREFIX: &str = ".job-";

/// Where the video to analyze comes from
#[derive(Clone, Debug, PartialEq)]
pub enum VideoSource {
    /// A file the service just stored from a multipart upload
    Upload(PathBuf),
    /// A client-supplied path (relative paths resolve against the project root)
    Reference(String),
}

/// Job failure
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("No video provided")]
    MissingVideo,

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Job IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job task failed: {0}")]
    Internal(String),
}

impl JobError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, JobError::MissingVideo)
    }
}

/// Completed job as returned to HTTP clients
#[derive(Clone, Debug)]
pub struct JobOutcome {
    pub job_id: JobId,
    /// Store key of the artifact to serve, if any
    pub file_name: Option<ArtifactName>,
    pub artifact_path: Option<PathBuf>,
    pub stream_url: Option<String>,
    pub result: JobResult,
}

/// Runs analysis jobs end to end
#[derive(Clone)]
pub struct JobOrchestrator {
    settings: Arc<ServiceSettings>,
    engine: Arc<dyn AnalysisEngine>,
    transcoder: Arc<Transcoder>,
    store: ArtifactStore,
}

impl JobOrchestrator {
    /// Creates the orchestrator. Settings must already be resolved; the
    /// uploads and outputs directories are created here.
    pub fn new(settings: Arc<ServiceSettings>, engine: Arc<dyn AnalysisEngine>) -> CoreResult<Self> {
        std::fs::create_dir_all(&settings.paths.uploads_dir)?;
        let store = ArtifactStore::open(&settings.paths.outputs_dir)?;
        let transcoder = Arc::new(Transcoder::from_settings(&settings, store.clone()));
        Ok(Self {
            settings,
            engine,
            transcoder,
            store,
        })
    }

    /// Orchestrator backed by the configured analysis process.
    pub fn from_settings(settings: Arc<ServiceSettings>) -> CoreResult<Self> {
        let engine = Arc::new(ProcessAnalysisEngine::from_settings(&settings));
        Self::new(settings, engine)
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    /// Allocates a unique path in the uploads directory for a client file name.
    pub fn prepare_upload(&self, original_name: Option<&str>) -> PathBuf {
        let name = original_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(sanitize_file_name)
            .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());
        self.settings
            .paths
            .uploads_dir
            .join(format!("{}_{}", new_job_id(), name))
    }

    /// Runs one job to completion.
    ///
    /// The pipeline runs in a spawned task, so dropping the returned future
    /// (client disconnect) does not cancel the analysis or the encode.
    pub async fn run(&self, source: VideoSource) -> Result<JobOutcome, JobError> {
        let source_video = self.resolve_source(source)?;
        let job_id = new_job_id();
        let request = self.build_request(job_id, source_video);

        let this = self.clone();
        tokio::spawn(async move { this.execute(request).await })
            .await
            .map_err(|e| JobError::Internal(e.to_string()))?
    }

    fn resolve_source(&self, source: VideoSource) -> Result<PathBuf, JobError> {
        match source {
            VideoSource::Upload(path) => Ok(path),
            VideoSource::Reference(reference) => {
                let reference = reference.trim();
                if reference.is_empty() {
                    return Err(JobError::MissingVideo);
                }
                Ok(resolve_relative_to(
                    &self.settings.paths.project_root,
                    Path::new(reference),
                ))
            }
        }
    }

    fn build_request(&self, job_id: JobId, source_video: PathBuf) -> JobRequest {
        let analysis = &self.settings.analysis;
        JobRequest {
            job_id: job_id.clone(),
            source_video,
            model_weights: analysis.weights.clone(),
            output_directory: self
                .store
                .root()
                .join(format!("{SCRATCH_PREFIX}{job_id}")),
            image_size: analysis.image_size,
            frame_skip: analysis.frame_skip,
            confidence: analysis.confidence,
            max_frames: analysis.max_frames,
            save_video: true,
        }
    }

    async fn execute(&self, request: JobRequest) -> Result<JobOutcome, JobError> {
        let scratch = request.output_directory.clone();
        tokio::fs::create_dir_all(&scratch).await?;

        let outcome = self.process(request).await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            warn!(path = %scratch.display(), "Failed to remove job directory: {}", e);
        }
        outcome
    }

    async fn process(&self, request: JobRequest) -> Result<JobOutcome, JobError> {
        info!(job_id = %request.job_id, video = %request.source_video.display(), "Job started");

        let result = match self.engine.invoke(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(job_id = %request.job_id, "Job failed: {}", e);
                return Err(e.into());
            }
        };

        let artifact_path = match result.output_video() {
            Some(declared) => {
                let raw = resolve_relative_to(&self.settings.paths.project_root, Path::new(declared));
                self.select_artifact(&request.source_video, &raw).await
            }
            None => None,
        };
        let file_name = artifact_path
            .as_deref()
            .and_then(|path| self.store.name_of(path));
        let stream_url = file_name.as_deref().map(|name| self.stream_url_for(name));

        match &stream_url {
            Some(url) => info!(job_id = %request.job_id, stream_url = %url, "Job completed"),
            None => warn!(job_id = %request.job_id, "Job completed without a servable video"),
        }

        Ok(JobOutcome {
            job_id: request.job_id,
            file_name,
            artifact_path,
            stream_url,
            result,
        })
    }

    /// Moves the raw output to its tracked name, then prefers its normalized form.
    ///
    /// Raw outputs outside the store are never served.
    async fn select_artifact(&self, source: &Path, raw: &Path) -> Option<PathBuf> {
        let name = tracked_name(source, raw);
        let tracked = match self.store.adopt(raw, &name).await {
            Ok(path) => path,
            Err(e) => {
                warn!(raw = %raw.display(), "Raw output is not servable: {}", e);
                return None;
            }
        };
        match self.transcoder.normalize(&tracked).await {
            Some(normalized) => Some(normalized),
            None => Some(tracked),
        }
    }

    /// Public URL of the streaming route for an artifact.
    pub fn stream_url_for(&self, name: &str) -> String {
        let base = self.settings.server.public_base_url.as_deref().unwrap_or("");
        format!("{}/video/{}", base, encode_path_segment(name))
    }
}

/// Store name of a tracked output: the source stem, `_tracked`, and the raw
/// output's extension (`mp4` when it has none).
fn tracked_name(source: &Path, raw: &Path) -> ArtifactName {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = raw
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "mp4".to_string());
    sanitize_file_name(&format!("{stem}{TRACKED_SUFFIX}.{ext}"))
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
pub fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
