//! Error types for linkdigest.
//!
//! Library crates use [`LinkDigestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all linkdigest operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkDigestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// One or more required environment variables are unset or empty.
    #[error("missing required environment variables: {}", vars.join(", "))]
    MissingEnv { vars: Vec<String> },

    /// Network/HTTP error while fetching a linked page.
    #[error("network error: {0}")]
    Network(String),

    /// Artifact or mapping persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Text-generation service error.
    #[error("summarize error: {0}")]
    Summarize(String),

    /// Messaging service error (auth, listing, editing).
    #[error("channel error: {0}")]
    Channel(String),

    /// The messaging service asked us to slow down.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, malformed document, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LinkDigestError>;

impl LinkDigestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LinkDigestError::config("bad toml");
        assert_eq!(err.to_string(), "config error: bad toml");

        let err = LinkDigestError::validation("unsupported scheme ftp");
        assert!(err.to_string().contains("ftp"));
    }

    #[test]
    fn missing_env_lists_every_variable() {
        let err = LinkDigestError::MissingEnv {
            vars: vec!["TELEGRAM_CHANNEL".into(), "OPENAI_API_KEY".into()],
        };
        assert_eq!(
            err.to_string(),
            "missing required environment variables: TELEGRAM_CHANNEL, OPENAI_API_KEY"
        );
    }
}
