//! vidtrack Core Type Definitions
//!
//! Defines fundamental types shared between the core modules and the HTTP layer.

// =============================================================================
// ID Types
// =============================================================================

/// Job unique identifier (ULID)
pub type JobId = String;

/// Base file name of an artifact inside the artifact store
pub type ArtifactName = String;

/// Creates a new time-sortable job identifier.
pub fn new_job_id() -> JobId {
    ulid::Ulid::new().to_string()
}

// =============================================================================
// Media Types
// =============================================================================

/// Fallback MIME type for unknown extensions
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Extension to MIME type table used when serving artifacts.
const MIME_TABLE: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("ogv", "video/ogg"),
    ("json", "application/json"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
];

/// Looks up a MIME type for a file extension (case-insensitive).
pub fn mime_for_extension(ext: &str) -> &'static str {
    let ext = ext.to_ascii_lowercase();
    MIME_TABLE
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
}

/// Looks up a MIME type for a path based on its extension.
pub fn mime_for_path(path: &std::path::Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(mime_for_extension)
        .unwrap_or(DEFAULT_MIME_TYPE)
}
