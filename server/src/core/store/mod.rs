//! Artifact Store
//!
//! A directory-backed registry of output files addressed by base file name.
//! Names coming from HTTP clients are only ever used as a single final path
//! component below the store root.

use std::path::{Path, PathBuf};

use crate::core::{mime_for_path, ArtifactName};

/// Artifact store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid artifact name: {0}")]
    InvalidName(String),

    #[error("Artifact not found: {0}")]
    NotFound(ArtifactName),

    #[error("Artifact store IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for crate::core::CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidName(name) => crate::core::CoreError::InvalidArtifactName(name),
            StoreError::NotFound(name) => crate::core::CoreError::ArtifactNotFound(name),
            StoreError::Io(e) => crate::core::CoreError::IoError(e),
        }
    }
}

/// A file present in the store
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Base file name (store key)
    pub name: ArtifactName,
    /// Absolute path on disk
    pub path: PathBuf,
    /// Size in bytes at lookup time
    pub size: u64,
    /// MIME type derived from the extension
    pub mime: &'static str,
}

/// Directory-backed artifact registry
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens the store, creating the root directory if absent.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        // Canonical root keeps `name_of` comparisons stable across symlinks.
        let root = std::fs::canonicalize(&root)?;
        Ok(Self { root })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a client-supplied name to a path strictly inside the root.
    ///
    /// The file does not need to exist.
    pub fn path_for(&self, name: &str) -> StoreResult<PathBuf> {
        validate_artifact_name(name)?;
        Ok(self.root.join(name))
    }

    /// Looks up an existing regular file by name.
    pub async fn lookup(&self, name: &str) -> StoreResult<Artifact> {
        let path = self.path_for(name)?;
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        if !meta.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }

        Ok(Artifact {
            name: name.to_string(),
            mime: mime_for_path(&path),
            size: meta.len(),
            path,
        })
    }

    /// Moves a file that already lives below the root (directly or in a job
    /// scratch directory) to `name` at the root. An existing artifact with
    /// that name is replaced.
    pub async fn adopt(&self, path: &Path, name: &str) -> StoreResult<PathBuf> {
        let target = self.path_for(name)?;
        let source = match tokio::fs::canonicalize(path).await {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        if !source.starts_with(&self.root) {
            return Err(StoreError::InvalidName(format!(
                "{}: outside the artifact store",
                path.display()
            )));
        }
        if !tokio::fs::metadata(&source).await?.is_file() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        if source != target {
            tokio::fs::rename(&source, &target).await?;
        }
        Ok(target)
    }

    /// Returns the store key for a path when the file lives directly in the root.
    pub fn name_of(&self, path: &Path) -> Option<ArtifactName> {
        let canonical = std::fs::canonicalize(path).ok()?;
        if canonical.parent()? != self.root {
            return None;
        }
        let name = canonical.file_name()?.to_str()?.to_string();
        validate_artifact_name(&name).ok()?;
        Some(name)
    }

    /// Deterministic name of the normalized artifact for a raw output:
    /// the raw file stem followed by `suffix` (e.g. `match_tracked` → `match_tracked_h264.mp4`).
    pub fn normalized_name(raw: &Path, suffix: &str) -> Option<ArtifactName> {
        let stem = raw.file_stem()?.to_str()?;
        if stem.is_empty() {
            return None;
        }
        Some(format!("{stem}{suffix}"))
    }
}

/// Validates that an artifact name is safe to use as a single path component.
///
/// Rejects empty names, `.`/`..`, path separators, drive prefixes and control
/// characters (including NUL). Dots inside a name (`clip..v2.mp4`) are allowed.
pub fn validate_artifact_name(name: &str) -> StoreResult<()> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidName("name is empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(StoreError::InvalidName(format!(
            "{name}: contains path traversal characters"
        )));
    }
    if name.contains('/') || name.contains('\\') || name.contains(':') {
        return Err(StoreError::InvalidName(format!(
            "{name}: contains path separators"
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(StoreError::InvalidName(
            "name contains control characters".to_string(),
        ));
    }
    Ok(())
}

/// Maps a client-provided file name onto `[A-Za-z0-9._-]`, replacing every
/// other character with `_` and collapsing leading dots.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').replace("..", "_");
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("outputs");
        let store = ArtifactStore::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), std::fs::canonicalize(&root).unwrap());
    }

    #[test]
    fn test_validate_artifact_name() {
        assert!(validate_artifact_name("match_tracked_h264.mp4").is_ok());
        assert!(validate_artifact_name("clip.v2.mp4").is_ok());
        assert!(validate_artifact_name("clip..v2.mp4").is_ok());
        assert!(validate_artifact_name("...").is_ok());
        assert!(validate_artifact_name("").is_err());
        assert!(validate_artifact_name("   ").is_err());
        assert!(validate_artifact_name("..").is_err());
        assert!(validate_artifact_name(".").is_err());
        assert!(validate_artifact_name("../secret.mp4").is_err());
        assert!(validate_artifact_name("a/b.mp4").is_err());
        assert!(validate_artifact_name("a\\b.mp4").is_err());
        assert!(validate_artifact_name("C:evil.mp4").is_err());
        assert!(validate_artifact_name("bad\0name").is_err());
    }

    #[test]
    fn test_path_for_stays_in_root() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let path = store.path_for("clip.mp4").unwrap();
        assert_eq!(path.parent().unwrap(), store.root());
        assert!(store.path_for("/etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_lookup_existing_artifact() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        std::fs::write(store.root().join("clip.mp4"), b"0123456789").unwrap();

        let artifact = store.lookup("clip.mp4").await.unwrap();
        assert_eq!(artifact.name, "clip.mp4");
        assert_eq!(artifact.size, 10);
        assert_eq!(artifact.mime, "video/mp4");
    }

    #[tokio::test]
    async fn test_lookup_missing_artifact() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let err = store.lookup("nonexistent.mp4").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_lookup_directory_is_not_an_artifact() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        std::fs::create_dir(store.root().join("nested")).unwrap();
        let err = store.lookup("nested").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_name_of_inside_and_outside_root() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("outputs")).unwrap();

        let inside = store.root().join("a.mp4");
        std::fs::write(&inside, b"x").unwrap();
        assert_eq!(store.name_of(&inside), Some("a.mp4".to_string()));

        let outside = other.path().join("b.mp4");
        std::fs::write(&outside, b"x").unwrap();
        assert_eq!(store.name_of(&outside), None);

        let nested_dir = store.root().join("sub");
        std::fs::create_dir(&nested_dir).unwrap();
        let nested = nested_dir.join("c.mp4");
        std::fs::write(&nested, b"x").unwrap();
        assert_eq!(store.name_of(&nested), None);

        assert_eq!(store.name_of(&store.root().join("missing.mp4")), None);
    }

    #[tokio::test]
    async fn test_adopt_moves_scratch_output_to_root() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("outputs")).unwrap();
        let scratch = store.root().join(".job-1");
        std::fs::create_dir(&scratch).unwrap();
        let raw = scratch.join("processed_output.mp4");
        std::fs::write(&raw, b"tracked").unwrap();

        let adopted = store.adopt(&raw, "match_tracked.mp4").await.unwrap();
        assert_eq!(adopted, store.root().join("match_tracked.mp4"));
        assert_eq!(std::fs::read(&adopted).unwrap(), b"tracked");
        assert!(!raw.exists());

        // Adopting a file onto its own name leaves it in place
        let again = store.adopt(&adopted, "match_tracked.mp4").await.unwrap();
        assert_eq!(std::fs::read(again).unwrap(), b"tracked");
    }

    #[tokio::test]
    async fn test_adopt_replaces_existing_artifact() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        std::fs::write(store.root().join("clip_tracked.mp4"), b"old").unwrap();
        let raw = store.root().join("processed_output.mp4");
        std::fs::write(&raw, b"new").unwrap();

        let adopted = store.adopt(&raw, "clip_tracked.mp4").await.unwrap();
        assert_eq!(std::fs::read(adopted).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_adopt_rejects_foreign_and_missing_files() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("outputs")).unwrap();

        let outside = other.path().join("processed_output.mp4");
        std::fs::write(&outside, b"x").unwrap();
        let err = store.adopt(&outside, "a_tracked.mp4").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));
        assert!(outside.is_file());

        let missing = store.root().join("gone.mp4");
        let err = store.adopt(&missing, "a_tracked.mp4").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let inside = store.root().join("b.mp4");
        std::fs::write(&inside, b"x").unwrap();
        assert!(store.adopt(&inside, "../escape.mp4").await.is_err());
        assert!(inside.is_file());
    }

    #[test]
    fn test_normalized_name() {
        assert_eq!(
            ArtifactStore::normalized_name(Path::new("outputs/match_tracked.mp4"), "_h264.mp4"),
            Some("match_tracked_h264.mp4".to_string())
        );
        assert_eq!(
            ArtifactStore::normalized_name(Path::new("/x/clip.avi"), "_h264.mp4"),
            Some("clip_h264.mp4".to_string())
        );
        assert_eq!(ArtifactStore::normalized_name(Path::new("/"), "_h264.mp4"), None);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("match.mp4"), "match.mp4");
        assert_eq!(sanitize_file_name("my clip (1).mp4"), "my_clip__1_.mp4");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\videos\\game.mov"), "game.mov");
        assert_eq!(sanitize_file_name("..hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name("ünï.mp4"), "_n_.mp4");
    }
}
