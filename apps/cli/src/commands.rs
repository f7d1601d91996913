//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use linkdigest_channel::BotApiSource;
use linkdigest_core::{
    MessageOutcome, Pipeline, PipelineOptions, ProgressReporter, ReconcileMode, ReconcileReport,
    SaveReport, UrlOutcome,
};
use linkdigest_fetcher::{FetchOptions, HttpFetcher};
use linkdigest_shared::{AppConfig, Settings, env_vars, init_config, load_config};
use linkdigest_storage::{ArticleStore, purge_dir};
use linkdigest_summarizer::OpenAiSummarizer;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// linkdigest: summaries for the links shared in a channel.
#[derive(Parser)]
#[command(
    name = "linkdigest",
    version,
    about = "Summarize articles linked from channel posts and write the summaries back.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch and summarize linked articles, then write the message → summary mapping.
    Save {
        /// Number of recent messages to scan (overrides config and MAX_MESSAGES).
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Append the stored summaries to their messages.
    Update,

    /// Reset mapped messages to their bare list of URLs.
    Restore,

    /// Delete everything under the articles directory.
    Clean,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Filter from RUST_LOG, falling back to the verbosity flag.
fn env_filter(verbose: u8) -> tracing_subscriber::EnvFilter {
    let filter = match verbose {
        0 => "linkdigest=info",
        1 => "linkdigest=debug",
        _ => "linkdigest=trace",
    };

    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter))
}

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;

    let env_filter = env_filter(cli.verbose);

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

/// Load `.env` from the working directory or its parents, if present.
///
/// Runs before tracing exists; pass the result to [`log_dotenv`] once it does.
pub(crate) fn load_dotenv() -> dotenvy::Result<PathBuf> {
    dotenvy::dotenv()
}

pub(crate) fn log_dotenv(outcome: &dotenvy::Result<PathBuf>) {
    match outcome {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => debug!("no .env file"),
        Err(e) => warn!(error = %e, "failed to read .env"),
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Save { limit } => cmd_save(limit).await,
        Command::Update => cmd_reconcile(ReconcileMode::Append).await,
        Command::Restore => cmd_reconcile(ReconcileMode::ReplaceWithUrls).await,
        Command::Clean => cmd_clean().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Config file plus environment. Fails listing every missing required variable.
fn resolve() -> Result<Settings> {
    let app = load_config()?;
    let settings = Settings::from_env(app)?;
    info!(
        channel = %settings.credentials.channel,
        language = %settings.app.defaults.language,
        model = %settings.app.summarizer.model,
        "configuration loaded"
    );
    Ok(settings)
}

fn build_pipeline(settings: &Settings) -> Result<Pipeline> {
    let source = BotApiSource::new(
        &settings.app.telegram.api_base,
        &settings.credentials.bot_token,
    )?;
    let fetcher = HttpFetcher::new(FetchOptions::from(&settings.app.fetch))?;
    let summarizer = OpenAiSummarizer::from_config(
        &settings.app.summarizer,
        &settings.credentials.openai_api_key,
        &settings.app.defaults.language,
    )?;
    let articles = ArticleStore::open(settings.language_dir())?;

    Ok(Pipeline::new(
        Arc::new(source),
        Arc::new(fetcher),
        Arc::new(summarizer),
        articles,
    )
    .with_options(PipelineOptions::from(settings)))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_save(limit: Option<usize>) -> Result<()> {
    let mut settings = resolve()?;
    if let Some(limit) = limit {
        if limit == 0 {
            return Err(eyre!("--limit must be at least 1"));
        }
        settings.app.defaults.max_messages = limit;
    }

    let pipeline = build_pipeline(&settings)?;
    let reporter = CliProgress::new();
    let report = match pipeline
        .run_save(&settings.credentials.channel, &reporter)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            reporter.abandon();
            return Err(e.into());
        }
    };

    print_save_report(&report, &pipeline);
    Ok(())
}

async fn cmd_reconcile(mode: ReconcileMode) -> Result<()> {
    let settings = resolve()?;
    let pipeline = build_pipeline(&settings)?;

    let report = pipeline
        .run_reconcile(&settings.credentials.channel, mode)
        .await?;

    print_reconcile_report(&report, mode);
    Ok(())
}

async fn cmd_clean() -> Result<()> {
    let config = load_config()?;
    let base_dir = std::env::var(env_vars::BASE_DIR)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(config.defaults.base_dir);
    let dir = PathBuf::from(base_dir);

    let removed = purge_dir(&dir)?;
    println!("Removed {removed} entries from {}", dir.display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_save_report(report: &SaveReport, pipeline: &Pipeline) {
    println!();
    println!("  Save pass complete.");
    println!("  Messages:   {}", report.messages_scanned);
    println!("  With links: {}", report.messages_with_links);
    println!("  Summarized: {}", report.summarized);
    println!("  Reused:     {}", report.reused);
    println!("  Skipped:    {}", report.skipped.len());
    for (id, url, reason) in &report.skipped {
        println!("    - [{id}] {url}: {reason}");
    }
    println!("  Mapping:    {}", pipeline.mappings().path().display());
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

fn print_reconcile_report(report: &ReconcileReport, mode: ReconcileMode) {
    if !report.mapping_found {
        println!("No mapping found; run `linkdigest save` first.");
        return;
    }

    println!();
    println!("  {mode} pass complete.");
    println!("  Edited:    {}", report.count(MessageOutcome::Done));
    println!("  Unchanged: {}", report.count(MessageOutcome::Noop));
    println!("  Skipped:   {}", report.count(MessageOutcome::Skipped));
    println!("  Failed:    {}", report.count(MessageOutcome::Failed));
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    /// Clear the spinner when the pass fails before reaching `done`.
    fn abandon(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn url_processed(&self, url: &str, outcome: UrlOutcome) {
        let status = match outcome {
            UrlOutcome::Reused => "cached".to_string(),
            UrlOutcome::Saved => "summarized".to_string(),
            UrlOutcome::Skipped(reason) => format!("skipped: {reason}"),
        };
        self.spinner.set_message(format!("{url} ({status})"));
    }

    fn message_done(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processed [{current}/{total}] messages"));
    }

    fn done(&self, _report: &SaveReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_save_with_limit_and_global_flags() {
        let cli = Cli::try_parse_from(["linkdigest", "save", "--limit", "20", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Save { limit: Some(20) }));
    }

    #[test]
    fn parses_reconcile_commands() {
        let cli = Cli::try_parse_from(["linkdigest", "--log-format", "json", "restore"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Command::Restore));

        let cli = Cli::try_parse_from(["linkdigest", "update"]).unwrap();
        assert!(matches!(cli.command, Command::Update));
    }

    #[test]
    fn abandoned_spinner_is_finished() {
        let progress = CliProgress::new();
        progress.phase("Listing messages");
        progress.abandon();
        assert!(progress.spinner.is_finished());
    }

    #[test]
    fn rust_log_from_dotenv_drives_the_filter() {
        let dir = std::env::temp_dir().join(format!("ld-dotenv-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join(".env");
        std::fs::write(&file, "RUST_LOG=linkdigest=warn\n").unwrap();

        dotenvy::from_path_override(&file).unwrap();
        let filter = env_filter(2).to_string();

        assert!(filter.contains("linkdigest=warn"), "filter was {filter}");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(Cli::try_parse_from(["linkdigest", "publish"]).is_err());
    }
}
