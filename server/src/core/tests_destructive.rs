//! Destructive and Edge Case Tests for Core Models
//!
//! These tests verify the robustness of the core against hostile names,
//! malformed engine output and broken configuration.

use std::path::Path;

use crate::core::analysis::JobResult;
use crate::core::settings::ServiceSettings;
use crate::core::store::{sanitize_file_name, validate_artifact_name, ArtifactStore};
use crate::core::{mime_for_path, CoreError};

#[test]
fn test_destructive_artifact_names() {
    let hostile = [
        "../../etc/passwd",
        "..\\..\\windows\\win.ini",
        "/absolute.mp4",
        "C:\\video.mp4",
        "clip.mp4\0.txt",
        "line\nbreak.mp4",
        "..",
        "",
    ];
    for name in hostile {
        assert!(validate_artifact_name(name).is_err(), "accepted {name:?}");
    }
}

#[test]
fn test_destructive_sanitized_names_are_valid_artifacts() {
    let inputs = [
        "../../etc/passwd",
        "...",
        "a/../../b.mp4",
        "\u{202e}4pm.exe",
        "name with spaces & symbols!.mov",
        "\0",
    ];
    for input in inputs {
        let cleaned = sanitize_file_name(input);
        assert!(
            validate_artifact_name(&cleaned).is_ok(),
            "{input:?} -> {cleaned:?}"
        );
    }
}

#[tokio::test]
async fn test_destructive_lookup_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path().join("outputs")).unwrap();

    // A traversal name never reaches the filesystem.
    std::fs::write(dir.path().join("secret.mp4"), b"secret").unwrap();
    assert!(store.lookup("../secret.mp4").await.is_err());
}

#[test]
fn test_destructive_engine_output() {
    // Progress chatter mixed into stdout
    assert!(JobResult::parse("frame 1/100\n{\"output_video\": \"a.mp4\"}").is_err());
    // Truncated JSON
    assert!(JobResult::parse("{\"output_video\": \"a.mp").is_err());
    // Scalars
    assert!(JobResult::parse("null").is_err());
    assert!(JobResult::parse("\"a.mp4\"").is_err());
    // Wrong type for the path
    assert!(JobResult::parse("{\"output_video\": [\"a.mp4\"]}").is_err());

    // Blank path is treated as no video, not as a contract violation
    let result = JobResult::parse("{\"output_video\": \"   \"}").unwrap();
    assert_eq!(result.output_video(), None);
}

#[test]
fn test_destructive_settings_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{"server": {"port": 0, "host": "  "},
            "analysis": {"imageSize": 0, "frameSkip": 0, "confidence": 7.5, "maxFrames": 0},
            "limits": {"maxDiagnosticBytes": 1}}"#,
    )
    .unwrap();

    let settings = ServiceSettings::load(&path).unwrap();
    assert_eq!(settings.server.port, 5000);
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.analysis.image_size, 416);
    assert_eq!(settings.analysis.frame_skip, 1);
    assert_eq!(settings.analysis.confidence, Some(1.0));
    assert_eq!(settings.analysis.max_frames, None);
    assert_eq!(settings.limits.max_diagnostic_bytes, 1024);
}

#[test]
fn test_destructive_settings_wrong_types() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"server": {"port": "five thousand"}}"#).unwrap();

    let err = ServiceSettings::load(&path).unwrap_err();
    assert!(matches!(err, CoreError::SettingsLoadFailed { .. }));
}

#[test]
fn test_destructive_mime_lookup() {
    assert_eq!(mime_for_path(Path::new("noext")), "application/octet-stream");
    assert_eq!(mime_for_path(Path::new(".mp4")), "application/octet-stream");
    assert_eq!(mime_for_path(Path::new("CLIP.MP4")), "video/mp4");
    assert_eq!(mime_for_path(Path::new("a.tar.webm")), "video/webm");
}
