//! Process spawning helpers.
//!
//! Every external binary (the analysis engine, the encoder) is launched through
//! [`external_command`] so that working directory, search path and platform
//! creation flags are applied the same way everywhere.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Apply platform-specific flags to a tokio process command.
pub fn configure_tokio_command(cmd: &mut tokio::process::Command) {
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}

/// Builds the executable search path for child processes: the project root
/// first, followed by the inherited `PATH` entries.
pub fn search_path(project_root: &Path) -> OsString {
    let inherited = std::env::var_os("PATH").unwrap_or_default();
    let mut entries = vec![project_root.to_path_buf()];
    entries.extend(std::env::split_paths(&inherited));

    // join_paths only fails on entries containing the separator itself
    std::env::join_paths(&entries).unwrap_or(inherited)
}

/// Creates a command for an external program rooted at `project_root`.
///
/// stdin is closed; stdout and stderr are piped so callers can collect them.
pub fn external_command(program: &str, project_root: &Path) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.current_dir(project_root)
        .env("PATH", search_path(project_root))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    configure_tokio_command(&mut cmd);
    cmd
}

/// Append-only text buffer that keeps at most `limit` bytes, discarding the
/// oldest content first.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl TailBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Appends one line (a trailing newline is added).
    pub fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');

        if self.text.len() > self.limit {
            let mut cut = self.text.len() - self.limit;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
            self.truncated = true;
        }
    }

    /// Returns the retained text, prefixed with a marker when older output was dropped.
    pub fn into_string(self) -> String {
        if self.truncated {
            format!("[earlier output truncated]\n{}", self.text)
        } else {
            self.text
        }
    }
}
