//! scan-insight CLI library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (analyze, config)

pub mod cli;
pub mod commands;

pub use cli::{AnalyzeArgs, Cli, Commands};
pub use commands::{analyze, show_config};
