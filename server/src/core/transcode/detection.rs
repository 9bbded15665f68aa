//! Encoder detection

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::process::external_command;

/// Encoder availability as reported at startup and by the health route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderInfo {
    /// Program name or path as configured
    pub program: String,
    /// Version string from `-version`
    pub version: String,
}

/// Probes the configured encoder by running `<program> -version`.
///
/// Returns `None` when the binary cannot be launched or exits unsuccessfully.
pub async fn detect_encoder(program: &str, project_root: &Path) -> Option<EncoderInfo> {
    let output = match external_command(program, project_root)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            warn!(program = %program, "Encoder not available: {}", e);
            return None;
        }
    };

    if !output.status.success() {
        warn!(program = %program, status = %output.status, "Encoder version probe failed");
        return None;
    }

    let version = parse_version(&String::from_utf8_lossy(&output.stdout));
    info!(program = %program, version = %version, "Encoder detected");
    Some(EncoderInfo {
        program: program.to_string(),
        version,
    })
}

/// Parses the version from the first line: "ffmpeg version X.X.X ..."
fn parse_version(stdout: &str) -> String {
    let Some(first_line) = stdout.lines().next() else {
        return "unknown".to_string();
    };
    first_line
        .strip_prefix("ffmpeg version ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or(first_line)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("ffmpeg version 6.1.1 Copyright (c) 2000-2023\nbuilt with gcc"),
            "6.1.1"
        );
        assert_eq!(
            parse_version("ffmpeg version n7.0-static https://johnvansickle.com"),
            "n7.0-static"
        );
        assert_eq!(parse_version("custom encoder 1.0"), "custom encoder 1.0");
        assert_eq!(parse_version(""), "unknown");
    }

    #[tokio::test]
    async fn test_detect_missing_encoder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(detect_encoder("vidtrack-no-such-encoder", dir.path())
            .await
            .is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_detect_failing_encoder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(detect_encoder("false", dir.path()).await.is_none());
    }
}
