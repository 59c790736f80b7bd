//! Scan Insight
//!
//! Retrieval-augmented analysis of MRI images.
//!
//! # Usage
//!
//! ```bash
//! scan-insight analyze brain.png [more.jpg ...] [--top-k N] [--model NAME]
//! scan-insight config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (user config dir, `scan-insight/config.toml`)
//! 3. File given with `--config`
//! 4. Environment variables (`INSIGHT_*`, e.g. `INSIGHT_MODEL__API_KEY`)
//! 5. CLI flags

use anyhow::Result;

use insight_cli::{analyze, show_config, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Analyze(args) => {
            analyze(cli.config.as_deref(), cli.log_level.as_deref(), args).await?;
        }
        Commands::Config => {
            show_config(cli.config.as_deref(), cli.log_level.as_deref())?;
        }
    }

    Ok(())
}
