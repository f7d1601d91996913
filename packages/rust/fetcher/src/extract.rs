//! Best-effort plain-text extraction from article markup.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Turns raw markup into plain text suitable for summarization.
pub trait ContentExtractor: Send + Sync {
    /// Extract the readable text of `markup`, or `None` when nothing usable is found.
    fn extract(&self, markup: &str) -> Option<String>;
}

/// Containers tried in priority order before falling back to the whole document.
const CONTENT_SELECTORS: [&str; 3] = ["article", "main", "body"];

/// Elements whose text never belongs to the article.
const SKIPPED_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// scraper-backed [`ContentExtractor`].
///
/// Prefers `<article>`, then `<main>`, then `<body>`, then the whole document, and collapses
/// every whitespace run to a single space.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlTextExtractor;

impl ContentExtractor for HtmlTextExtractor {
    fn extract(&self, markup: &str) -> Option<String> {
        let doc = Html::parse_document(markup);

        let container = CONTENT_SELECTORS
            .iter()
            .filter_map(|sel| Selector::parse(sel).ok())
            .find_map(|sel| doc.select(&sel).next())
            .unwrap_or_else(|| doc.root_element());

        debug!(container = container.value().name(), "extracting text");

        let text = collapse_whitespace(&visible_text(container));
        if text.is_empty() { None } else { Some(text) }
    }
}

/// Concatenate text nodes under `root`, skipping script-like subtrees.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_TAGS.contains(&el.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
