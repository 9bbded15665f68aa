//! Transcode Module
//!
//! Re-encodes tracker output into a browser-playable H.264/AAC MP4 using an
//! external ffmpeg binary. The encoder is optional at runtime: every failure
//! degrades to "no normalized artifact" rather than failing the job.

mod detection;
mod normalizer;

pub use detection::*;
pub use normalizer::Transcoder;

use std::ffi::OsString;
use std::path::Path;

/// Transcode error types
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Encoder could not be launched: {0}")]
    Launch(#[source] std::io::Error),

    #[error("Encoder failed with exit code {code:?}: {stderr}")]
    EncodeFailed { code: Option<i32>, stderr: String },

    #[error("Encoder exited successfully but produced no output")]
    MissingOutput,

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("Transcode IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// Fixed encode profile for browser playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeProfile {
    pub video_codec: &'static str,
    pub pixel_format: &'static str,
    pub preset: &'static str,
    pub audio_codec: &'static str,
    pub audio_bitrate: &'static str,
}

impl TranscodeProfile {
    /// H.264 yuv420p with AAC audio and the moov atom up front.
    pub fn browser_h264() -> Self {
        Self {
            video_codec: "libx264",
            pixel_format: "yuv420p",
            preset: "veryfast",
            audio_codec: "aac",
            audio_bitrate: "128k",
        }
    }

    /// Encoder arguments; the output container is forced so temp names need no extension.
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-c:v".into(),
            self.video_codec.into(),
            "-pix_fmt".into(),
            self.pixel_format.into(),
            "-preset".into(),
            self.preset.into(),
            "-movflags".into(),
            "+faststart".into(),
            "-c:a".into(),
            self.audio_codec.into(),
            "-b:a".into(),
            self.audio_bitrate.into(),
            "-f".into(),
            "mp4".into(),
            output.as_os_str().to_owned(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcode_error_display() {
        let err = TranscodeError::EncodeFailed {
            code: Some(1),
            stderr: "Unknown encoder 'libx264'".to_string(),
        };
        assert!(err.to_string().contains("libx264"));
        assert!(TranscodeError::MissingOutput
            .to_string()
            .contains("no output"));
    }

    #[test]
    fn test_browser_profile_args() {
        let args: Vec<String> = TranscodeProfile::browser_h264()
            .args(Path::new("in.mp4"), Path::new("out.mp4"))
            .into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-i in.mp4"));
        assert!(joined.contains("-c:v libx264 -pix_fmt yuv420p"));
        assert!(joined.contains("-movflags +faststart"));
        assert!(joined.contains("-c:a aac -b:a 128k"));
    }
}
