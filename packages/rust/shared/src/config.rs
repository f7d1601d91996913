//! Application configuration for linkdigest.
//!
//! Tunables live in an optional TOML file at `~/.linkdigest/linkdigest.toml`.
//! Credentials and the channel identifier come from the environment only, and a handful of
//! environment variables override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LinkDigestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "linkdigest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".linkdigest";

/// Environment variable names.
pub mod env_vars {
    pub const BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
    pub const CHANNEL: &str = "TELEGRAM_CHANNEL";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const SUMMARY_LANG: &str = "SUMMARY_LANG";
    pub const MODEL_NAME: &str = "OPENAI_MODEL_NAME";
    pub const OPENAI_API_BASE: &str = "OPENAI_API_BASE";
    pub const MAX_MESSAGES: &str = "MAX_MESSAGES";
    pub const BASE_DIR: &str = "LINKDIGEST_BASE_DIR";
}

// ---------------------------------------------------------------------------
// Config structs (matching linkdigest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Text-generation settings.
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Page fetching settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Messaging service settings.
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root directory for artifacts; each language gets a subdirectory.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Language code summaries are written in.
    #[serde(default = "default_language")]
    pub language: String,

    /// Maximum number of channel messages scanned per save pass.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            language: default_language(),
            max_messages: default_max_messages(),
        }
    }
}

fn default_base_dir() -> String {
    "articles".into()
}
fn default_language() -> String {
    "en".into()
}
fn default_max_messages() -> usize {
    100
}

/// `[summarizer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Chat model name; also selects the context budget tier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,

    /// Tokens reserved for the generated summary.
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: usize,

    /// Tokens reserved for the system prompt and message framing.
    #[serde(default = "default_buffer_tokens")]
    pub buffer_tokens: usize,

    /// Attempts per summary, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff between attempts, in seconds.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_openai_api_base(),
            max_response_tokens: default_max_response_tokens(),
            buffer_tokens: default_buffer_tokens(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "gpt-4".into()
}
fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".into()
}
fn default_max_response_tokens() -> usize {
    1024
}
fn default_buffer_tokens() -> usize {
    100
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_secs() -> u64 {
    1
}
fn default_temperature() -> f32 {
    0.7
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum concurrent page fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Allow fetching loopback/private addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            allow_private_hosts: false,
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_concurrency() -> usize {
    4
}

/// `[telegram]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Base URL of the Bot API.
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

// ---------------------------------------------------------------------------
// Runtime settings (file config + environment)
// ---------------------------------------------------------------------------

/// Secrets and identifiers sourced from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub bot_token: String,
    pub channel: String,
    pub openai_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bot_token", &"<redacted>")
            .field("channel", &self.channel)
            .field("openai_api_key", &"<redacted>")
            .finish()
    }
}

/// Fully resolved configuration used to wire up a run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub app: AppConfig,
    pub credentials: Credentials,
}

impl Settings {
    /// Resolve against the process environment.
    pub fn from_env(app: AppConfig) -> Result<Self> {
        resolve_settings(app, |name| std::env::var(name).ok())
    }

    /// Directory holding artifacts and the mapping for the configured language.
    pub fn language_dir(&self) -> PathBuf {
        Path::new(&self.app.defaults.base_dir).join(&self.app.defaults.language)
    }
}

/// Apply environment overrides to `app` and collect the required credentials.
///
/// Every missing required variable is reported in a single [`LinkDigestError::MissingEnv`].
pub fn resolve_settings(
    mut app: AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let mut missing = Vec::new();
    let mut require = |name: &str| {
        let value = get(name);
        if value.is_none() {
            missing.push(name.to_string());
        }
        value.unwrap_or_default()
    };

    let bot_token = require(env_vars::BOT_TOKEN);
    let channel = require(env_vars::CHANNEL);
    let openai_api_key = require(env_vars::OPENAI_API_KEY);

    if !missing.is_empty() {
        tracing::error!(missing = %missing.join(", "), "missing required environment variables");
        return Err(LinkDigestError::MissingEnv { vars: missing });
    }

    if let Some(lang) = get(env_vars::SUMMARY_LANG) {
        app.defaults.language = lang;
    }
    app.defaults.language = app.defaults.language.trim().to_lowercase();

    if let Some(model) = get(env_vars::MODEL_NAME) {
        app.summarizer.model = model;
    }
    if let Some(base) = get(env_vars::OPENAI_API_BASE) {
        app.summarizer.api_base = base;
    }
    if let Some(dir) = get(env_vars::BASE_DIR) {
        app.defaults.base_dir = dir;
    }
    if let Some(raw) = get(env_vars::MAX_MESSAGES) {
        app.defaults.max_messages = raw.trim().parse().map_err(|e| {
            LinkDigestError::config(format!("{} must be a positive integer: {e}", env_vars::MAX_MESSAGES))
        })?;
    }

    Ok(Settings {
        app,
        credentials: Credentials {
            bot_token,
            channel,
            openai_api_key,
        },
    })
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.linkdigest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LinkDigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.linkdigest/linkdigest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LinkDigestError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LinkDigestError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LinkDigestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LinkDigestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LinkDigestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            (env_vars::BOT_TOKEN, "123:abc"),
            (env_vars::CHANNEL, "@links"),
            (env_vars::OPENAI_API_KEY, "sk-test"),
        ]
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_dir"));
        assert!(toml_str.contains("max_response_tokens"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.max_messages, 100);
        assert_eq!(parsed.summarizer.model, "gpt-4");
        assert_eq!(parsed.fetch.timeout_secs, 10);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let toml_str = r#"
[summarizer]
model = "gpt-3.5-turbo"

[fetch]
concurrency = 8
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.summarizer.model, "gpt-3.5-turbo");
        assert_eq!(config.summarizer.buffer_tokens, 100);
        assert_eq!(config.fetch.concurrency, 8);
        assert_eq!(config.defaults.language, "en");
    }

    #[test]
    fn resolve_reports_every_missing_variable() {
        let err = resolve_settings(AppConfig::default(), env(&[(env_vars::CHANNEL, "@links")]))
            .unwrap_err();
        match err {
            LinkDigestError::MissingEnv { vars } => {
                assert_eq!(vars, vec![env_vars::BOT_TOKEN, env_vars::OPENAI_API_KEY]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = resolve_settings(
            AppConfig::default(),
            env(&[
                (env_vars::BOT_TOKEN, "  "),
                (env_vars::CHANNEL, "@links"),
                (env_vars::OPENAI_API_KEY, "sk"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains(env_vars::BOT_TOKEN));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut pairs = full_env();
        pairs.push((env_vars::SUMMARY_LANG, "DE"));
        pairs.push((env_vars::MODEL_NAME, "gpt-4o"));
        pairs.push((env_vars::MAX_MESSAGES, "25"));
        pairs.push((env_vars::BASE_DIR, "/tmp/out"));

        let settings = resolve_settings(AppConfig::default(), env(&pairs)).expect("resolve");
        assert_eq!(settings.app.defaults.language, "de");
        assert_eq!(settings.app.summarizer.model, "gpt-4o");
        assert_eq!(settings.app.defaults.max_messages, 25);
        assert_eq!(settings.language_dir(), PathBuf::from("/tmp/out/de"));
        assert_eq!(settings.credentials.channel, "@links");
    }

    #[test]
    fn bad_numeric_override_is_a_config_error() {
        let mut pairs = full_env();
        pairs.push((env_vars::MAX_MESSAGES, "lots"));
        let err = resolve_settings(AppConfig::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, LinkDigestError::Config { .. }));
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let settings = resolve_settings(AppConfig::default(), env(&full_env())).unwrap();
        let rendered = format!("{:?}", settings.credentials);
        assert!(!rendered.contains("sk-test"));
        assert!(!rendered.contains("123:abc"));
        assert!(rendered.contains("@links"));
    }
}
