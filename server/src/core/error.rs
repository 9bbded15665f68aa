//! vidtrack Error Definitions
//!
//! Defines the general error type shared by the core modules. Component
//! specific failures (analysis, transcoding, artifact lookup) have their own
//! enums next to the code that produces them and convert into `CoreError`
//! where they cross module boundaries.

use thiserror::Error;

use super::ArtifactName;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Artifact Errors
    // =========================================================================
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(ArtifactName),

    #[error("Invalid artifact name: {0}")]
    InvalidArtifactName(String),

    // =========================================================================
    // Settings Errors
    // =========================================================================
    #[error("Failed to load settings from {path}: {reason}")]
    SettingsLoadFailed { path: String, reason: String },

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;
