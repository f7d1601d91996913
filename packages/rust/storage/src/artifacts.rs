//! Summary artifacts: one immutable text file per (message, URL).

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use linkdigest_shared::{ArtifactKey, LinkDigestError, Result};

use crate::{ensure_dir, write_atomic};

/// Directory of summary artifacts for a single language.
#[derive(Debug, Clone)]
pub struct ArticleStore {
    dir: PathBuf,
}

impl ArticleStore {
    /// Open (creating if needed) the artifact directory `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            dir: ensure_dir(dir)?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    pub fn exists(&self, key: &ArtifactKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Read an artifact. A missing artifact is `Ok(None)`.
    pub fn read(&self, key: &ArtifactKey) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "artifact not found");
                Ok(None)
            }
            Err(e) => Err(LinkDigestError::io(path, e)),
        }
    }

    /// Persist `summary` under `key`.
    ///
    /// Artifacts are never rewritten: returns `Ok(false)` without touching the file when
    /// one already exists, `Ok(true)` after a fresh write.
    pub fn write(&self, key: &ArtifactKey, summary: &str) -> Result<bool> {
        let path = self.path_for(key);
        if path.exists() {
            warn!(path = %path.display(), "artifact already exists, keeping it");
            return Ok(false);
        }
        write_atomic(&path, summary.as_bytes())?;
        info!(path = %path.display(), bytes = summary.len(), "summary saved");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use linkdigest_shared::MessageId;

    use super::*;
    use crate::test_support::scratch_dir;

    #[test]
    fn write_then_read() {
        let dir = scratch_dir("ld-articles");
        let store = ArticleStore::open(dir.join("en")).unwrap();
        let key = ArtifactKey::derive(MessageId(1), "https://x.test/a");

        assert!(!store.exists(&key));
        assert!(store.write(&key, "Zusammenfassung ✓").unwrap());
        assert!(store.exists(&key));
        assert_eq!(store.read(&key).unwrap().as_deref(), Some("Zusammenfassung ✓"));
        assert_eq!(store.path_for(&key), dir.join("en").join("1_https_x_test_a.md"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn existing_artifacts_are_never_overwritten() {
        let dir = scratch_dir("ld-articles");
        let store = ArticleStore::open(&dir).unwrap();
        let key = ArtifactKey::derive(MessageId(2), "https://x.test/b");

        assert!(store.write(&key, "first").unwrap());
        assert!(!store.write(&key, "second").unwrap());
        assert_eq!(store.read(&key).unwrap().as_deref(), Some("first"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn reading_a_missing_artifact_is_none() {
        let dir = scratch_dir("ld-articles");
        let store = ArticleStore::open(&dir).unwrap();
        let key = ArtifactKey::derive(MessageId(3), "https://x.test/c");
        assert_eq!(store.read(&key).unwrap(), None);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
