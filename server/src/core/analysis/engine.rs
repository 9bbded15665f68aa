//! Process-backed analysis engine.
//!
//! Launches the configured tracker (e.g. `python3 track.py`) with the fixed
//! argument contract, collects stdout as the result payload and forwards
//! stderr to the log as it arrives.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

use super::{AnalysisEngine, AnalysisError, AnalysisResult, JobRequest, JobResult};
use crate::core::process::{external_command, TailBuffer};
use crate::core::settings::ServiceSettings;

/// Runs the tracker as a child process per request
#[derive(Clone, Debug)]
pub struct ProcessAnalysisEngine {
    program: String,
    leading_args: Vec<String>,
    project_root: PathBuf,
    max_diagnostic_bytes: usize,
}

impl ProcessAnalysisEngine {
    pub fn new(
        program: impl Into<String>,
        leading_args: Vec<String>,
        project_root: impl Into<PathBuf>,
        max_diagnostic_bytes: usize,
    ) -> Self {
        Self {
            program: program.into(),
            leading_args,
            project_root: project_root.into(),
            max_diagnostic_bytes,
        }
    }

    /// Builds the engine from resolved settings.
    pub fn from_settings(settings: &ServiceSettings) -> Self {
        Self::new(
            settings.analysis.program.clone(),
            settings.analysis.script.clone(),
            settings.paths.project_root.clone(),
            settings.limits.max_diagnostic_bytes,
        )
    }

    /// Full argument vector passed after the program name.
    pub fn command_args(&self, request: &JobRequest) -> Vec<OsString> {
        self.leading_args
            .iter()
            .map(OsString::from)
            .chain(request.to_args())
            .collect()
    }
}

#[async_trait]
impl AnalysisEngine for ProcessAnalysisEngine {
    async fn invoke(&self, request: &JobRequest) -> AnalysisResult<JobResult> {
        let mut cmd = external_command(&self.program, &self.project_root);
        cmd.args(self.command_args(request));

        let mut child = cmd.spawn().map_err(|source| {
            warn!(program = %self.program, "Analysis process could not be launched: {}", source);
            AnalysisError::Launch {
                program: self.program.clone(),
                source,
            }
        })?;

        let started = Instant::now();
        info!(
            job_id = %request.job_id,
            pid = ?child.id(),
            video = %request.source_video.display(),
            "Analysis process started"
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let job_id = request.job_id.clone();
        let limit = self.max_diagnostic_bytes;

        // All three futures are driven together so neither pipe can fill up and
        // stall the child, and the child is always reaped before returning.
        let (stdout, diagnostics, status) = tokio::join!(
            read_all(stdout),
            forward_stderr(stderr, job_id, limit),
            child.wait()
        );
        let status = status?;
        let stdout = stdout?;

        debug!(
            job_id = %request.job_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            stdout_bytes = stdout.len(),
            "Analysis process exited with {}",
            status
        );

        if !status.success() {
            return Err(AnalysisError::ProcessFailed {
                code: status.code(),
                stderr: diagnostics.into_string(),
            });
        }

        let raw = String::from_utf8_lossy(&stdout).into_owned();
        let result = JobResult::parse(&raw)
            .map_err(|reason| AnalysisError::ContractViolation { reason, raw })?;

        info!(
            job_id = %request.job_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            total_frames = ?result.total_frames(),
            output_video = ?result.output_video(),
            "Analysis completed"
        );

        Ok(result)
    }
}

/// Reads a child pipe to the end. A missing pipe reads as empty.
async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Forwards stderr line by line to the log and keeps a bounded tail for diagnostics.
async fn forward_stderr<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    job_id: String,
    limit: usize,
) -> TailBuffer {
    let mut tail = TailBuffer::new(limit);
    let Some(pipe) = pipe else {
        return tail;
    };

    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end_matches(['\r', '\n']);
                info!(target: "vidtrack::engine", job_id = %job_id, "{}", text);
                tail.push_line(text);
            }
            Err(e) => {
                warn!(job_id = %job_id, "Failed to read analysis stderr: {}", e);
                break;
            }
        }
    }
    tail
}
