//! vidtrack Service Library
//!
//! HTTP job service that runs an external detection/tracking process over
//! uploaded or referenced videos, normalizes the annotated output for browser
//! playback and streams it back with range support.

pub mod core;
pub mod http;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::core::jobs::JobOrchestrator;
use crate::core::settings::ServiceSettings;
use crate::core::transcode::detect_encoder;
use crate::core::CoreResult;
use crate::http::{router, AppState};

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Default log directory: the platform data dir, falling back to `.logs`.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("vidtrack").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".logs"))
}

/// Installs the global subscriber: stdout plus a daily rolling file.
///
/// `RUST_LOG` refines the filter; `info` is always enabled. Safe to call more
/// than once (later calls are no-ops).
pub fn init_logging(log_dir: &Path) {
    use tracing_subscriber::prelude::*;

    let file_layer = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, "vidtrack.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = LOG_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false),
            )
        }
        Err(e) => {
            eprintln!("Failed to create log dir {}: {}", log_dir.display(), e);
            None
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(cfg!(debug_assertions));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Global tracing subscriber already set");
    }
}

/// Builds the application state: working directories, orchestrator and
/// encoder probe. `settings` must already be resolved.
pub async fn build_state(settings: ServiceSettings) -> CoreResult<Arc<AppState>> {
    let settings = Arc::new(settings);
    let orchestrator = JobOrchestrator::from_settings(Arc::clone(&settings))?;

    let encoder = detect_encoder(&settings.transcode.program, &settings.paths.project_root).await;
    if encoder.is_none() {
        tracing::warn!(
            "Encoder `{}` not available; tracked videos will be served unnormalized",
            settings.transcode.program
        );
    }

    Ok(Arc::new(AppState::new(orchestrator, encoder)))
}

/// Binds the listener and serves until the process is stopped.
pub async fn serve(settings: ServiceSettings) -> CoreResult<()> {
    let address = settings.bind_address();
    let state = build_state(settings).await?;
    {
        let settings = state.orchestrator.settings();
        tracing::info!(
            project_root = %settings.paths.project_root.display(),
            uploads = %settings.paths.uploads_dir.display(),
            outputs = %settings.paths.outputs_dir.display(),
            "vidtrack starting..."
        );
    }

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_state_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = ServiceSettings::default();
        settings.paths.project_root = dir.path().to_path_buf();
        settings.transcode.program = "vidtrack-no-such-encoder".to_string();

        let state = build_state(settings.resolved().unwrap()).await.unwrap();
        assert!(dir.path().join("uploads").is_dir());
        assert!(dir.path().join("outputs").is_dir());
        assert!(state.encoder.is_none());
    }

    #[test]
    fn test_default_log_dir_is_named() {
        let dir = default_log_dir();
        assert!(dir.ends_with("vidtrack/logs") || dir == Path::new(".logs"));
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        init_logging(dir.path());
        init_logging(dir.path());
    }
}
