//! vidtrack command-line entry point.
//!
//! Settings precedence: settings file, then `PORT`/`HOST`, then flags.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use vidtrack_lib::core::settings::ServiceSettings;

#[derive(Debug, Parser)]
#[command(
    name = "vidtrack",
    version,
    about = "Video tracking job service with range-aware media delivery"
)]
struct Cli {
    /// JSON settings file (missing file = defaults)
    #[arg(long, env = "VIDTRACK_CONFIG", default_value = "vidtrack.json")]
    config: PathBuf,

    /// Listen address
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides `PORT`)
    #[arg(long)]
    port: Option<u16>,

    /// Directory the tracker runs in; relative paths resolve against it
    #[arg(long)]
    project_root: Option<PathBuf>,

    #[arg(long)]
    uploads_dir: Option<PathBuf>,

    #[arg(long)]
    outputs_dir: Option<PathBuf>,

    /// Model weights passed to the tracker
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Encoder binary used for normalization
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Base URL prefixed to returned stream URLs
    #[arg(long)]
    public_base_url: Option<String>,

    /// Directory for rolling log files
    #[arg(long, env = "VIDTRACK_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(self, settings: &mut ServiceSettings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(root) = self.project_root {
            settings.paths.project_root = root;
        }
        if let Some(dir) = self.uploads_dir {
            settings.paths.uploads_dir = dir;
        }
        if let Some(dir) = self.outputs_dir {
            settings.paths.outputs_dir = dir;
        }
        if let Some(weights) = self.weights {
            settings.analysis.weights = weights;
        }
        if let Some(program) = self.ffmpeg {
            settings.transcode.program = program;
        }
        if let Some(url) = self.public_base_url {
            settings.server.public_base_url = Some(url);
        }
        if let Some(dir) = self.log_dir {
            settings.paths.log_dir = Some(dir);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = ServiceSettings::load(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    settings.apply_env();
    cli.apply(&mut settings);
    settings.normalize();
    let settings = settings.resolved().context("resolving settings paths")?;

    let log_dir = settings
        .paths
        .log_dir
        .clone()
        .unwrap_or_else(vidtrack_lib::default_log_dir);
    vidtrack_lib::init_logging(&log_dir);
    tracing::info!(
        address = %settings.bind_address(),
        project_root = %settings.paths.project_root.display(),
        "Settings loaded"
    );

    vidtrack_lib::serve(settings).await?;
    Ok(())
}
