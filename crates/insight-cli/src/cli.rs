//! CLI argument parsing for scan-insight.
//!
//! CLI flags override every other configuration source.

use clap::{Args, Parser, Subcommand};

/// Scan Insight
///
/// Describes MRI images, retrieves similar reference cases and produces a
/// diagnostic narrative.
#[derive(Parser, Debug)]
#[command(name = "scan-insight")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides the default in the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze one or more MRI images (JPEG or PNG)
    Analyze(AnalyzeArgs),

    /// Print the effective configuration with secrets omitted
    Config,
}

/// Overrides for a single analyze run.
#[derive(Args, Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// Image files to analyze
    #[arg(required = true)]
    pub images: Vec<String>,

    /// Documents to retrieve per query
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Reasoning model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Upper bound on reasoning cycles
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Context size limit (in the configured unit)
    #[arg(long)]
    pub context_limit: Option<usize>,

    /// Analyses to run at the same time
    #[arg(short = 'j', long, default_value = "4")]
    pub jobs: usize,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
