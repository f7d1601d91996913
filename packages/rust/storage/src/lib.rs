//! File-backed storage for summary artifacts and the message → summary mapping.
//!
//! Everything lives under one language directory, `{base_dir}/{language}/`:
//! - one plain-text artifact per summarized URL, named by its [`ArtifactKey`]
//! - `message_summary_mapping.json`, the only state carried between runs
//!
//! Writes go through a temp file and a rename so a crash never leaves a truncated file
//! behind that a later run would mistake for a finished artifact.
//!
//! [`ArtifactKey`]: linkdigest_shared::ArtifactKey

mod artifacts;
mod mapping;

use std::path::{Path, PathBuf};

use linkdigest_shared::{LinkDigestError, Result};

pub use artifacts::ArticleStore;
pub use mapping::{MAPPING_FILE_NAME, MappingStore};

/// Write `contents` to `path` via a sibling temp file and an atomic rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| LinkDigestError::Storage(format!("not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    std::fs::write(&tmp, contents).map_err(|e| LinkDigestError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        LinkDigestError::io(path, e)
    })
}

/// Ensure `dir` exists and return it.
pub(crate) fn ensure_dir(dir: impl Into<PathBuf>) -> Result<PathBuf> {
    let dir = dir.into();
    std::fs::create_dir_all(&dir).map_err(|e| LinkDigestError::io(&dir, e))?;
    Ok(dir)
}

/// Remove everything inside `dir` (files and subdirectories), keeping `dir` itself.
///
/// Entries that cannot be removed are logged and skipped. Returns the number of entries
/// removed; a missing `dir` removes nothing.
pub fn purge_dir(dir: &Path) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(dir = %dir.display(), "nothing to clean");
            return Ok(0);
        }
        Err(e) => return Err(LinkDigestError::io(dir, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| LinkDigestError::io(dir, e))?;
        let path = entry.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                tracing::info!(path = %path.display(), "deleted");
                removed += 1;
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to delete"),
        }
    }
    Ok(removed)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_dir;

    #[test]
    fn write_atomic_leaves_no_temp_file() {
        let dir = ensure_dir(scratch_dir("ld-atomic")).unwrap();
        let path = dir.join("a.md");
        write_atomic(&path, b"hello").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        let names: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn purge_removes_files_and_directories() {
        let base = ensure_dir(scratch_dir("ld-purge")).unwrap();
        let en = ensure_dir(base.join("en")).unwrap();
        std::fs::write(en.join("1_x.md"), "s").unwrap();
        std::fs::write(base.join("stray.txt"), "s").unwrap();

        assert_eq!(purge_dir(&base).unwrap(), 2);
        assert!(base.exists());
        assert_eq!(std::fs::read_dir(&base).unwrap().count(), 0);

        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn purge_of_missing_dir_is_a_noop() {
        assert_eq!(purge_dir(&scratch_dir("ld-missing")).unwrap(), 0);
    }
}
