//! Pipeline orchestration for linkdigest.
//!
//! Ties the channel, fetcher, summarizer and storage crates together into the two passes
//! the CLI runs:
//! - [`Pipeline::run_save`] summarizes linked articles and writes the mapping
//! - [`Pipeline::run_reconcile`] rewrites channel messages from that mapping

pub mod pipeline;
pub mod reconcile;
pub mod session;
pub mod urls;

pub use pipeline::{
    Pipeline, PipelineOptions, ProgressReporter, SaveReport, SilentProgress, SkipReason,
    UrlOutcome,
};
pub use reconcile::{MessageOutcome, ReconcileMode, ReconcileReport};
pub use session::{RateLimitPolicy, with_session};
pub use urls::extract_urls;
