//! Core domain types: messages, artifact keys, and the message → summary mapping.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LinkDigestError;

// ---------------------------------------------------------------------------
// MessageId / Message
// ---------------------------------------------------------------------------

/// Identifier of a message inside a channel, as assigned by the messaging service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = LinkDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| LinkDigestError::validation(format!("invalid message id '{s}': {e}")))
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A channel message. Read-only to the pipeline except through edit requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
}

impl Message {
    pub fn new(id: impl Into<MessageId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactKey
// ---------------------------------------------------------------------------

/// File extension appended to every artifact key.
const ARTIFACT_EXTENSION: &str = ".md";

static NON_WORD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Deterministic storage key for the summary of one URL shared in one message.
///
/// Doubles as the artifact's file name: `{message_id}_{sanitized_url}.md`, where every
/// run of non-word characters in the URL becomes a single `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Derive the key for `url` as shared in message `message_id`.
    pub fn derive(message_id: MessageId, url: &str) -> Self {
        let sanitized = NON_WORD_RUN.replace_all(url, "_");
        Self(format!("{message_id}_{sanitized}{ARTIFACT_EXTENSION}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// One successfully summarized URL of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRef {
    pub url: String,
    pub filename: ArtifactKey,
}

impl SummaryRef {
    pub fn new(url: impl Into<String>, filename: ArtifactKey) -> Self {
        Self {
            url: url.into(),
            filename,
        }
    }
}

/// Durable link between source messages and their generated artifacts.
///
/// Entries keep insertion order, which follows message processing order. Serialized as a
/// JSON object keyed by the message id string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping {
    entries: IndexMap<MessageId, Vec<SummaryRef>>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `id`. A replaced entry keeps its original position.
    pub fn insert(&mut self, id: MessageId, refs: Vec<SummaryRef>) {
        self.entries.insert(id, refs);
    }

    pub fn get(&self, id: MessageId) -> Option<&[SummaryRef]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (MessageId, &[SummaryRef])> {
        self.entries.iter().map(|(id, refs)| (*id, refs.as_slice()))
    }

    pub fn message_ids(&self) -> Vec<MessageId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of summary references across all entries.
    pub fn summary_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_key_is_deterministic() {
        let a = ArtifactKey::derive(MessageId(42), "https://a.test/p?q=1");
        let b = ArtifactKey::derive(MessageId(42), "https://a.test/p?q=1");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "42_https_a_test_p_q_1.md");
    }

    #[test]
    fn artifact_key_depends_on_message_id() {
        let a = ArtifactKey::derive(MessageId(42), "https://a.test/p?q=1");
        let b = ArtifactKey::derive(MessageId(43), "https://a.test/p?q=1");
        assert_ne!(a, b);
    }

    #[test]
    fn artifact_key_collapses_runs_of_punctuation() {
        let key = ArtifactKey::derive(MessageId(7), "https://x.test/a--b/?c=d&e=f");
        assert_eq!(key.as_str(), "7_https_x_test_a_b_c_d_e_f.md");
        assert!(!key.as_str().contains('/'));
    }

    #[test]
    fn mapping_serializes_in_insertion_order() {
        let mut mapping = Mapping::new();
        mapping.insert(MessageId(30), vec![]);
        mapping.insert(
            MessageId(10),
            vec![SummaryRef::new(
                "https://x.test/1",
                ArtifactKey::derive(MessageId(10), "https://x.test/1"),
            )],
        );
        mapping.insert(MessageId(20), vec![]);

        let json = serde_json::to_string(&mapping).unwrap();
        let p30 = json.find("\"30\"").unwrap();
        let p10 = json.find("\"10\"").unwrap();
        let p20 = json.find("\"20\"").unwrap();
        assert!(p30 < p10 && p10 < p20, "order lost: {json}");
        assert!(json.contains(r#""filename":"10_https_x_test_1.md""#));
    }

    #[test]
    fn mapping_parses_documents_in_file_order() {
        let json = r#"{
            "5": [{"url": "https://b.test", "filename": "5_https_b_test.md"}],
            "3": []
        }"#;
        let mapping: Mapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.message_ids(), vec![MessageId(5), MessageId(3)]);
        assert_eq!(mapping.get(MessageId(5)).unwrap()[0].url, "https://b.test");
        assert!(mapping.get(MessageId(3)).unwrap().is_empty());
    }

    #[test]
    fn reinserting_keeps_position() {
        let mut mapping = Mapping::new();
        mapping.insert(MessageId(2), vec![]);
        mapping.insert(MessageId(1), vec![]);
        mapping.insert(
            MessageId(2),
            vec![SummaryRef::new(
                "https://x.test/2",
                ArtifactKey::derive(MessageId(2), "https://x.test/2"),
            )],
        );

        assert_eq!(mapping.message_ids(), vec![MessageId(2), MessageId(1)]);
        assert_eq!(mapping.summary_count(), 1);
    }

    #[test]
    fn mapping_rejects_non_numeric_keys() {
        let result: Result<Mapping, _> = serde_json::from_str(r#"{"abc": []}"#);
        assert!(result.is_err());
    }
}
