//! Save pass: message links → fetched articles → summaries → artifacts + mapping.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use linkdigest_channel::MessageSource;
use linkdigest_fetcher::{ContentExtractor, HtmlTextExtractor, PageFetcher, fetch_all};
use linkdigest_shared::{ArtifactKey, Mapping, Message, MessageId, Result, Settings, SummaryRef};
use linkdigest_storage::{ArticleStore, MappingStore};
use linkdigest_summarizer::Summarizer;

use crate::session::{RateLimitPolicy, with_session};
use crate::urls::extract_urls;

// ---------------------------------------------------------------------------
// Options & reports
// ---------------------------------------------------------------------------

/// Tunables for a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Messages listed per save pass.
    pub max_messages: usize,
    /// Concurrent fetches per message.
    pub fetch_concurrency: usize,
    /// Handling of "slow down" signals from the messaging service.
    pub rate_limit: RateLimitPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_messages: 100,
            fetch_concurrency: 4,
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

impl From<&Settings> for PipelineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            max_messages: settings.app.defaults.max_messages,
            fetch_concurrency: settings.app.fetch.concurrency,
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

/// Why a URL did not make it into the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    FetchFailed,
    NoText,
    SummaryFailed,
    WriteFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FetchFailed => "fetch failed",
            Self::NoText => "no extractable text",
            Self::SummaryFailed => "summarization failed",
            Self::WriteFailed => "artifact write failed",
        };
        f.write_str(s)
    }
}

/// What happened to one URL during a save pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlOutcome {
    /// An artifact from an earlier run was reused without fetching.
    Reused,
    /// Fetched, summarized and persisted in this run.
    Saved,
    Skipped(SkipReason),
}

/// Result of [`Pipeline::run_save`].
#[derive(Debug, Default)]
pub struct SaveReport {
    /// The mapping that was written.
    pub mapping: Mapping,
    /// Messages returned by the source.
    pub messages_scanned: usize,
    /// Messages with at least one candidate URL.
    pub messages_with_links: usize,
    pub reused: usize,
    pub summarized: usize,
    /// URLs left out of the mapping, with the reason.
    pub skipped: Vec<(MessageId, String, SkipReason)>,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once per URL occurrence, in message order.
    fn url_processed(&self, url: &str, outcome: UrlOutcome);
    /// Called after each message is handled.
    fn message_done(&self, current: usize, total: usize);
    /// Called when the save pass completes.
    fn done(&self, report: &SaveReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn url_processed(&self, _url: &str, _outcome: UrlOutcome) {}
    fn message_done(&self, _current: usize, _total: usize) {}
    fn done(&self, _report: &SaveReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Coordinates the save and reconcile passes over one channel and one language directory.
pub struct Pipeline {
    pub(crate) source: Arc<dyn MessageSource>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn ContentExtractor>,
    summarizer: Arc<dyn Summarizer>,
    pub(crate) articles: ArticleStore,
    pub(crate) mappings: MappingStore,
    pub(crate) options: PipelineOptions,
}

impl Pipeline {
    /// The mapping document lives next to the artifacts in `articles`.
    pub fn new(
        source: Arc<dyn MessageSource>,
        fetcher: Arc<dyn PageFetcher>,
        summarizer: Arc<dyn Summarizer>,
        articles: ArticleStore,
    ) -> Self {
        let mappings = MappingStore::new(articles.dir());
        Self {
            source,
            fetcher,
            extractor: Arc::new(HtmlTextExtractor),
            summarizer,
            articles,
            mappings,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn articles(&self) -> &ArticleStore {
        &self.articles
    }

    pub fn mappings(&self) -> &MappingStore {
        &self.mappings
    }

    /// Run the save pass over `channel` and overwrite the stored mapping.
    ///
    /// Per-URL failures are logged and left out of the mapping. Failing to connect or to
    /// list messages aborts the pass; the session is released either way.
    #[instrument(skip_all, fields(channel = %channel))]
    pub async fn run_save(
        &self,
        channel: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<SaveReport> {
        let start = Instant::now();
        info!(dir = %self.articles.dir().display(), "starting save pass");

        let mut report = with_session(self.source.as_ref(), move || {
            self.collect(channel, progress)
        })
        .await?;

        progress.phase("Saving mapping");
        self.mappings.save(&report.mapping)?;

        report.elapsed = start.elapsed();
        info!(
            messages = report.messages_scanned,
            with_links = report.messages_with_links,
            reused = report.reused,
            summarized = report.summarized,
            skipped = report.skipped.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "save pass complete"
        );
        progress.done(&report);
        Ok(report)
    }

    async fn collect(&self, channel: &str, progress: &dyn ProgressReporter) -> Result<SaveReport> {
        progress.phase("Listing messages");
        let source = self.source.as_ref();
        let limit = self.options.max_messages;
        let messages = self
            .options
            .rate_limit
            .run(move || source.list_messages(channel, limit))
            .await?;

        let mut report = SaveReport {
            messages_scanned: messages.len(),
            ..SaveReport::default()
        };
        info!(count = messages.len(), "messages listed");

        progress.phase("Summarizing links");
        let total = messages.len();
        for (i, message) in messages.iter().enumerate() {
            let urls = extract_urls(&message.text);
            if urls.is_empty() {
                debug!(id = %message.id, "no links, skipping message");
            } else {
                report.messages_with_links += 1;
                let refs = self.process_message(message, &urls, &mut report, progress).await;
                report.mapping.insert(message.id, refs);
            }
            progress.message_done(i + 1, total);
        }

        Ok(report)
    }

    /// Summarize the links of one message. Returned refs follow the order of `urls`.
    #[instrument(skip_all, fields(id = %message.id, urls = urls.len()))]
    async fn process_message(
        &self,
        message: &Message,
        urls: &[String],
        report: &mut SaveReport,
        progress: &dyn ProgressReporter,
    ) -> Vec<SummaryRef> {
        let keys: Vec<ArtifactKey> = urls
            .iter()
            .map(|url| ArtifactKey::derive(message.id, url))
            .collect();

        // Existing artifacts are checkpoints from earlier runs; duplicates are fetched once.
        let mut queued = HashSet::new();
        let pending: Vec<String> = urls
            .iter()
            .zip(&keys)
            .filter(|(url, key)| !self.articles.exists(key) && queued.insert(url.as_str()))
            .map(|(url, _)| url.clone())
            .collect();

        let fetched = fetch_all(
            self.fetcher.clone(),
            pending,
            self.options.fetch_concurrency,
        )
        .await;

        let mut outcomes: HashMap<String, UrlOutcome> = HashMap::new();
        for (url, body) in fetched {
            let key = ArtifactKey::derive(message.id, &url);
            let outcome = self.summarize_and_store(&url, &key, body).await;
            match outcome {
                UrlOutcome::Saved => report.summarized += 1,
                UrlOutcome::Skipped(reason) => {
                    report.skipped.push((message.id, url.clone(), reason));
                }
                UrlOutcome::Reused => {}
            }
            outcomes.insert(url, outcome);
        }

        let mut refs = Vec::with_capacity(urls.len());
        for (url, key) in urls.iter().zip(keys) {
            let outcome = outcomes.get(url).copied().unwrap_or(UrlOutcome::Reused);
            progress.url_processed(url, outcome);
            match outcome {
                UrlOutcome::Reused => {
                    debug!(%url, "artifact exists, reusing");
                    report.reused += 1;
                    refs.push(SummaryRef::new(url.as_str(), key));
                }
                UrlOutcome::Saved => refs.push(SummaryRef::new(url.as_str(), key)),
                UrlOutcome::Skipped(_) => {}
            }
        }
        refs
    }

    async fn summarize_and_store(
        &self,
        url: &str,
        key: &ArtifactKey,
        body: Result<String>,
    ) -> UrlOutcome {
        let markup = match body {
            Ok(markup) => markup,
            Err(e) => {
                warn!(%url, error = %e, "fetch failed, skipping");
                return UrlOutcome::Skipped(SkipReason::FetchFailed);
            }
        };

        let Some(text) = self.extractor.extract(&markup) else {
            warn!(%url, "no text extracted, skipping");
            return UrlOutcome::Skipped(SkipReason::NoText);
        };

        let input = format!("content: {text}, url: {url}");
        let Some(summary) = self.summarizer.summarize(&input).await else {
            warn!(%url, "no summary produced, skipping");
            return UrlOutcome::Skipped(SkipReason::SummaryFailed);
        };

        match self.articles.write(key, &summary) {
            Ok(_) => {
                info!(%url, file = %key, "summary stored");
                UrlOutcome::Saved
            }
            Err(e) => {
                error!(%url, error = %e, "failed to store summary, skipping");
                UrlOutcome::Skipped(SkipReason::WriteFailed)
            }
        }
    }
}
