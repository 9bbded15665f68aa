//! Idempotent normalization of raw tracker output.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{TranscodeError, TranscodeProfile, TranscodeResult};
use crate::core::process::{external_command, TailBuffer};
use crate::core::settings::ServiceSettings;
use crate::core::store::ArtifactStore;

type TargetLocks = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

/// Produces `<stem><suffix>` in the artifact store from a raw video.
///
/// Concurrent requests for the same target within this process are serialized
/// and the encode runs at most once; later callers reuse the existing file.
pub struct Transcoder {
    program: String,
    project_root: PathBuf,
    store: ArtifactStore,
    suffix: String,
    profile: TranscodeProfile,
    max_diagnostic_bytes: usize,
    locks: TargetLocks,
}

impl Transcoder {
    pub fn new(
        program: impl Into<String>,
        project_root: impl Into<PathBuf>,
        store: ArtifactStore,
        suffix: impl Into<String>,
        max_diagnostic_bytes: usize,
    ) -> Self {
        Self {
            program: program.into(),
            project_root: project_root.into(),
            store,
            suffix: suffix.into(),
            profile: TranscodeProfile::browser_h264(),
            max_diagnostic_bytes,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &ServiceSettings, store: ArtifactStore) -> Self {
        Self::new(
            settings.transcode.program.clone(),
            settings.paths.project_root.clone(),
            store,
            settings.transcode.suffix.clone(),
            settings.limits.max_diagnostic_bytes,
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the normalized artifact path for `raw`, encoding it if needed.
    ///
    /// `None` means no normalized artifact is available: the raw file is
    /// missing, the encoder is absent, or the encode failed.
    pub async fn normalize(&self, raw: &Path) -> Option<PathBuf> {
        let name = ArtifactStore::normalized_name(raw, &self.suffix)?;
        let target = match self.store.path_for(&name) {
            Ok(path) => path,
            Err(e) => {
                warn!(raw = %raw.display(), "Cannot derive normalized name: {}", e);
                return None;
            }
        };

        if !raw.is_file() {
            warn!(raw = %raw.display(), "Raw output missing, skipping normalization");
            return None;
        }
        if target.is_file() {
            debug!(output = %target.display(), "Normalized artifact already present");
            return Some(target);
        }

        let lock = self.lock_for(&target);
        let _guard = lock.lock().await;

        // Another request may have finished the same target while we waited.
        if target.is_file() {
            return Some(target);
        }
        match self.encode(raw, &target).await {
            Ok(()) => Some(target),
            Err(e) => {
                warn!(raw = %raw.display(), "Normalization failed: {}", e);
                None
            }
        }
    }

    /// Per-target lock. Entries nobody holds any more are pruned on the way in.
    fn lock_for(&self, target: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(target.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn encode(&self, raw: &Path, target: &Path) -> TranscodeResult<()> {
        let file_name = target
            .file_name()
            .ok_or_else(|| TranscodeError::InvalidInput(target.display().to_string()))?;
        let partial = self.store.root().join(format!(
            ".{}.{}.partial",
            file_name.to_string_lossy(),
            ulid::Ulid::new()
        ));

        let started = Instant::now();
        info!(raw = %raw.display(), output = %target.display(), "Normalizing video");

        let output = external_command(&self.program, &self.project_root)
            .args(self.profile.args(raw, &partial))
            .output()
            .await
            .map_err(TranscodeError::Launch)?;

        if !output.status.success() {
            remove_partial(&partial).await;
            let mut stderr = TailBuffer::new(self.max_diagnostic_bytes);
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                stderr.push_line(line);
            }
            return Err(TranscodeError::EncodeFailed {
                code: output.status.code(),
                stderr: stderr.into_string(),
            });
        }

        if !partial.is_file() {
            return Err(TranscodeError::MissingOutput);
        }

        if let Err(e) = tokio::fs::rename(&partial, target).await {
            remove_partial(&partial).await;
            return Err(TranscodeError::Io(e));
        }

        info!(
            output = %target.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Normalization complete"
        );
        Ok(())
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Failed to remove partial encode: {}", e);
        }
    }
}
