//! linkdigest CLI: summarize the articles linked in a channel and write the
//! summaries back into its messages.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    // `.env` may set RUST_LOG, so it has to be loaded before the filter is built.
    let dotenv = commands::load_dotenv();
    commands::init_tracing(&cli);
    commands::log_dotenv(&dotenv);
    commands::run(cli).await
}
