//! Shared types, error model, and configuration for linkdigest.
//!
//! This crate is the foundation depended on by all other linkdigest crates.
//! It provides:
//! - [`LinkDigestError`]: the unified error type
//! - Domain types ([`Message`], [`MessageId`], [`ArtifactKey`], [`Mapping`])
//! - Configuration ([`AppConfig`], [`Settings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, Credentials, DefaultsConfig, FetchConfig, Settings, SummarizerConfig,
    TelegramConfig, config_dir, config_file_path, env_vars, init_config, load_config,
    load_config_from, resolve_settings,
};
pub use error::{LinkDigestError, Result};
pub use types::{ArtifactKey, Mapping, Message, MessageId, SummaryRef};
