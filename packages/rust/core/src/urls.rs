//! Candidate URL extraction from message text.

use std::sync::LazyLock;

use regex::Regex;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

/// Every `http(s)://` run of non-whitespace in `text`, in order of appearance.
///
/// Duplicates are kept; trailing punctuation is part of the match.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}
