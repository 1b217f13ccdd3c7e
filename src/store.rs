// Artifact storage: downloaded files keyed by generated file id.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Filesystem directory holding downloaded artifacts.
///
/// Files are named `{file_id}.{ext}`; the extension is only known once the
/// download resolves it, so lookups go by file-id prefix.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a new artifact with a resolved extension.
    pub fn path_for(&self, file_id: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{file_id}.{ext}"))
    }

    /// Locate a stored artifact by file-id prefix match, returning its path
    /// and filename.
    pub fn find(&self, file_id: &str) -> Result<(PathBuf, String)> {
        if !file_id.is_empty() {
            for entry in std::fs::read_dir(&self.dir)? {
                let entry = entry?;
                let filename = entry.file_name().to_string_lossy().to_string();
                if filename.starts_with(file_id) && entry.path().is_file() {
                    return Ok((entry.path(), filename));
                }
            }
        }
        Err(Error::TaskNotFound(format!("no artifact for {file_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_directory_and_finds_by_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("artifacts")).unwrap();

        std::fs::write(store.path_for("abc-123", "mp4"), b"data").unwrap();

        let (path, filename) = store.find("abc-123").unwrap();
        assert_eq!(filename, "abc-123.mp4");
        assert!(path.ends_with("abc-123.mp4"));
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path()).unwrap();
        assert!(matches!(
            store.find("nope"),
            Err(Error::TaskNotFound(_))
        ));
        assert!(matches!(store.find(""), Err(Error::TaskNotFound(_))));
    }
}
