//! Reconcile pass: rewrite channel messages from a stored mapping.
//!
//! Every mapped message starts out pending and ends in exactly one of
//! [`MessageOutcome`]'s states. Text composition is a pure function of the mode, the
//! current text, and the stored data, so it can be tested without a channel.

use std::fmt;

use tracing::{error, info, instrument, warn};

use linkdigest_channel::EditOutcome;
use linkdigest_shared::{MessageId, Result, SummaryRef};

use crate::pipeline::Pipeline;
use crate::session::with_session;

/// How a reconciled message's text is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Append the stored summaries below the current text (`update`).
    Append,
    /// Replace the text with the mapped URLs, one per line (`restore`).
    ReplaceWithUrls,
}

impl ReconcileMode {
    /// New text for a message currently reading `original`.
    ///
    /// Falls back to `original` when there is nothing to append or no URL to restore, so a
    /// message is never blanked.
    pub fn compose(self, original: &str, urls: &[&str], summaries: &[String]) -> String {
        match self {
            Self::Append if !summaries.is_empty() => {
                format!("{original}\n\n{}", summaries.join("\n"))
            }
            Self::ReplaceWithUrls if !urls.is_empty() => urls.join("\n"),
            _ => original.to_string(),
        }
    }
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => f.write_str("update"),
            Self::ReplaceWithUrls => f.write_str("restore"),
        }
    }
}

/// Final state of one mapped message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The message no longer exists, or could not be read.
    Skipped,
    /// The text already matched; nothing was changed.
    Noop,
    /// The message was edited.
    Done,
    /// The edit was rejected.
    Failed,
}

/// Result of [`Pipeline::run_reconcile`].
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Whether a mapping document was found. `false` means the pass did nothing.
    pub mapping_found: bool,
    /// Outcome per mapped message, in mapping order.
    pub outcomes: Vec<(MessageId, MessageOutcome)>,
}

impl ReconcileReport {
    pub fn count(&self, outcome: MessageOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }
}

impl Pipeline {
    /// Rewrite every message recorded in the stored mapping according to `mode`.
    ///
    /// Without a mapping document this logs a warning and returns an empty report before
    /// any session is opened.
    #[instrument(skip_all, fields(channel = %channel, mode = %mode))]
    pub async fn run_reconcile(&self, channel: &str, mode: ReconcileMode) -> Result<ReconcileReport> {
        let Some(mapping) = self.mappings.load()? else {
            warn!(path = %self.mappings.path().display(), "no mapping found, nothing to reconcile");
            return Ok(ReconcileReport::default());
        };

        let mapping = &mapping;
        let report = with_session(self.source.as_ref(), move || async move {
            let mut report = ReconcileReport {
                mapping_found: true,
                outcomes: Vec::with_capacity(mapping.len()),
            };
            for (id, refs) in mapping.iter() {
                let outcome = self.reconcile_message(channel, id, refs, mode).await;
                report.outcomes.push((id, outcome));
            }
            Ok(report)
        })
        .await?;

        info!(
            done = report.count(MessageOutcome::Done),
            noop = report.count(MessageOutcome::Noop),
            skipped = report.count(MessageOutcome::Skipped),
            failed = report.count(MessageOutcome::Failed),
            "reconcile pass complete"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn reconcile_message(
        &self,
        channel: &str,
        id: MessageId,
        refs: &[SummaryRef],
        mode: ReconcileMode,
    ) -> MessageOutcome {
        let source = self.source.as_ref();
        let rate_limit = self.options.rate_limit;

        let message = match rate_limit.run(move || source.get_message(channel, id)).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!("message not found, skipping");
                return MessageOutcome::Skipped;
            }
            Err(e) => {
                error!(error = %e, "failed to read message, skipping");
                return MessageOutcome::Skipped;
            }
        };

        let urls: Vec<&str> = refs.iter().map(|r| r.url.as_str()).collect();
        let summaries = match mode {
            ReconcileMode::Append => self.load_summaries(refs),
            ReconcileMode::ReplaceWithUrls => Vec::new(),
        };

        let new_text = mode.compose(&message.text, &urls, &summaries);
        if new_text == message.text {
            info!("text unchanged, no edit needed");
            return MessageOutcome::Noop;
        }

        let text = new_text.as_str();
        match rate_limit.run(move || source.edit_message(channel, id, text)).await {
            Ok(EditOutcome::Edited) => {
                info!("message updated");
                MessageOutcome::Done
            }
            Ok(EditOutcome::NotModified) => {
                info!("service reported message not modified");
                MessageOutcome::Noop
            }
            Err(e) => {
                error!(error = %e, "failed to edit message");
                MessageOutcome::Failed
            }
        }
    }

    /// Stored summaries for `refs`, in order. Unreadable artifacts are logged and left out.
    fn load_summaries(&self, refs: &[SummaryRef]) -> Vec<String> {
        refs.iter()
            .filter_map(|r| match self.articles.read(&r.filename) {
                Ok(Some(summary)) => Some(summary),
                Ok(None) => {
                    warn!(file = %r.filename, "summary file missing");
                    None
                }
                Err(e) => {
                    error!(file = %r.filename, error = %e, "failed to read summary");
                    None
                }
            })
            .collect()
    }
}
