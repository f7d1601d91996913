//! The mapping document linking source messages to their artifacts.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use linkdigest_shared::{LinkDigestError, Mapping, Result};

use crate::{ensure_dir, write_atomic};

/// File name of the mapping document inside the language directory.
pub const MAPPING_FILE_NAME: &str = "message_summary_mapping.json";

/// Loads and saves the [`Mapping`] document.
#[derive(Debug, Clone)]
pub struct MappingStore {
    path: PathBuf,
}

impl MappingStore {
    /// Mapping store for the language directory `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(MAPPING_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored mapping with `mapping` in full.
    pub fn save(&self, mapping: &Mapping) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        mapping
            .serialize(&mut ser)
            .map_err(|e| LinkDigestError::Storage(format!("failed to encode mapping: {e}")))?;

        write_atomic(&self.path, &buf)?;
        info!(
            path = %self.path.display(),
            messages = mapping.len(),
            summaries = mapping.summary_count(),
            "mapping saved"
        );
        Ok(())
    }

    /// Load the stored mapping. A missing document is `Ok(None)`.
    pub fn load(&self) -> Result<Option<Mapping>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(path = %self.path.display(), "mapping file does not exist");
                return Ok(None);
            }
            Err(e) => return Err(LinkDigestError::io(&self.path, e)),
        };

        let mapping: Mapping = serde_json::from_str(&content).map_err(|e| {
            LinkDigestError::Storage(format!("invalid mapping {}: {e}", self.path.display()))
        })?;
        info!(path = %self.path.display(), messages = mapping.len(), "mapping loaded");
        Ok(Some(mapping))
    }
}

#[cfg(test)]
mod tests {
    use linkdigest_shared::{ArtifactKey, MessageId, SummaryRef};

    use super::*;
    use crate::test_support::scratch_dir;

    fn sample() -> Mapping {
        let mut mapping = Mapping::new();
        let url = "https://x.test/über";
        mapping.insert(
            MessageId(9),
            vec![SummaryRef::new(url, ArtifactKey::derive(MessageId(9), url))],
        );
        mapping.insert(MessageId(4), vec![]);
        mapping
    }

    #[test]
    fn save_then_load() {
        let dir = scratch_dir("ld-mapping");
        let store = MappingStore::new(&dir);
        store.save(&sample()).unwrap();

        let loaded = store.load().unwrap().expect("mapping present");
        assert_eq!(loaded, sample());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn document_is_indented_and_keeps_unicode() {
        let dir = scratch_dir("ld-mapping");
        let store = MappingStore::new(&dir);
        store.save(&sample()).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with("{\n    \"9\": ["), "unexpected layout:\n{raw}");
        assert!(raw.contains("https://x.test/über"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_overwrites_previous_mapping() {
        let dir = scratch_dir("ld-mapping");
        let store = MappingStore::new(&dir);
        store.save(&sample()).unwrap();

        let mut replacement = Mapping::new();
        replacement.insert(MessageId(1), vec![]);
        store.save(&replacement).unwrap();

        assert_eq!(store.load().unwrap(), Some(replacement));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_document_is_none() {
        let store = MappingStore::new(scratch_dir("ld-mapping"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn corrupt_document_is_an_error() {
        let dir = scratch_dir("ld-mapping");
        std::fs::create_dir_all(&dir).unwrap();
        let store = MappingStore::new(&dir);
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.load(), Err(LinkDigestError::Storage(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
