//! Page fetching and plain-text extraction for linked articles.
//!
//! This crate provides:
//! - [`engine`]: [`PageFetcher`] seam, the reqwest-backed [`HttpFetcher`], and the
//!   order-preserving concurrent [`fetch_all`]
//! - [`extract`]: [`ContentExtractor`] seam and the scraper-backed [`HtmlTextExtractor`]

pub mod engine;
pub mod extract;

pub use engine::{FetchOptions, HttpFetcher, PageFetcher, fetch_all};
pub use extract::{ContentExtractor, HtmlTextExtractor};
