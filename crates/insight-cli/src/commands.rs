//! Command implementations for scan-insight.
//!
//! Handles:
//! - analyze: load config, build the pipeline, analyze each image
//! - config: print the effective settings

use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use insight_rag::Orchestrator;
use insight_types::Settings;

use crate::cli::AnalyzeArgs;

/// Heading printed above each answer.
pub const REPORT_HEADING: &str = "AI Diagnosis & Insights";

/// Load settings, then apply the log level override.
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

/// Apply per-run flags on top of loaded settings.
pub fn apply_overrides(settings: &mut Settings, args: &AnalyzeArgs) -> Result<()> {
    if let Some(k) = args.top_k {
        settings.pipeline.top_k = k;
    }
    if let Some(model) = &args.model {
        settings.model.model = model.clone();
    }
    if let Some(n) = args.max_iterations {
        settings.pipeline.max_iterations = n;
    }
    if let Some(limit) = args.context_limit {
        settings.pipeline.context_limit = limit;
    }
    settings.validate().context("Invalid configuration")?;
    Ok(())
}

/// Install the tracing subscriber. Logs go to stderr so stdout carries only reports.
pub fn init_tracing(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Read an image file, or the message to show when it cannot be read.
pub fn load_image(path: &str) -> std::result::Result<Vec<u8>, String> {
    match std::fs::read(Path::new(path)) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(format!("Error: The file {path} was not found."))
        }
        Err(e) => Err(format!("Error: The file {path} could not be read ({e}).")),
    }
}

/// Text block printed for one image.
pub fn render_report(path: &str, body: &str, with_path: bool) -> String {
    let mut out = String::new();
    if with_path {
        out.push_str(&format!("== {path} ==\n"));
    }
    out.push_str(REPORT_HEADING);
    out.push('\n');
    out.push_str(&"-".repeat(REPORT_HEADING.len()));
    out.push('\n');
    out.push_str(body.trim());
    out.push('\n');
    out
}

/// Cancel `token` on Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, cancelling analyses...");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
        }
    });
}

/// Analyze every image and print a report for each.
///
/// Fails (non-zero exit) if any image could not be analyzed.
pub async fn analyze(
    config_path: Option<&str>,
    log_level: Option<&str>,
    args: AnalyzeArgs,
) -> Result<()> {
    let mut settings = load_settings(config_path, log_level)?;
    apply_overrides(&mut settings, &args)?;
    init_tracing(&settings.log_level)?;

    let with_path = args.images.len() > 1;
    let mut failures = 0usize;

    let mut loaded = Vec::new();
    for path in &args.images {
        match load_image(path) {
            Ok(bytes) => loaded.push((path.clone(), bytes)),
            Err(message) => {
                failures += 1;
                println!("{}", render_report(path, &message, with_path));
            }
        }
    }

    if loaded.is_empty() {
        bail!("no readable images");
    }

    let orchestrator = match Orchestrator::from_settings(&settings).await {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Err(anyhow::Error::new(e).context("Failed to build pipeline"));
        }
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    info!(images = loaded.len(), jobs = args.jobs, "Starting analysis");

    let orchestrator = &orchestrator;
    let cancel = &cancel;
    let results: Vec<_> = stream::iter(loaded)
        .map(|(path, bytes)| async move {
            let result = orchestrator.try_analyze(&bytes, cancel).await;
            (path, result)
        })
        .buffered(args.jobs.max(1))
        .collect()
        .await;

    for (path, result) in results {
        let body = match result {
            Ok(analysis) => analysis.answer,
            Err(e) => {
                failures += 1;
                e.user_message()
            }
        };
        println!("{}", render_report(&path, &body, with_path));
    }

    if failures > 0 {
        bail!("{failures} of {} image(s) could not be analyzed", args.images.len());
    }
    Ok(())
}

/// Print the effective configuration as JSON. API keys are never serialized.
pub fn show_config(config_path: Option<&str>, log_level: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, log_level)?;
    let json = serde_json::to_string_pretty(&settings).context("Failed to render configuration")?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_message() {
        let message = load_image("/definitely/not/here.png").unwrap_err();
        assert_eq!(message, "Error: The file /definitely/not/here.png was not found.");
    }

    #[test]
    fn test_load_existing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xff, 0xd8, 0xff, 0xe0]).unwrap();
        let bytes = load_image(file.path().to_str().unwrap()).unwrap();
        assert_eq!(bytes.len(), 4);
    }

    #[test]
    fn test_report_layout() {
        let single = render_report("a.png", "  Likely meningioma.\n", false);
        assert!(single.starts_with(REPORT_HEADING));
        assert!(single.contains("Likely meningioma.\n"));
        assert!(!single.contains("a.png"));

        let multi = render_report("a.png", "x", true);
        assert!(multi.starts_with("== a.png =="));
    }

    #[test]
    fn test_overrides_applied_and_validated() {
        let mut settings = Settings::default();
        let args = AnalyzeArgs {
            images: vec!["a.png".to_string()],
            top_k: Some(3),
            model: Some("gpt-4o".to_string()),
            max_iterations: Some(6),
            context_limit: Some(1500),
            jobs: 1,
        };
        apply_overrides(&mut settings, &args).unwrap();
        assert_eq!(settings.pipeline.top_k, 3);
        assert_eq!(settings.model.model, "gpt-4o");
        assert_eq!(settings.pipeline.max_iterations, 6);
        assert_eq!(settings.pipeline.context_limit, 1500);

        let bad = AnalyzeArgs {
            top_k: Some(0),
            ..args
        };
        assert!(apply_overrides(&mut settings, &bad).is_err());
    }

    #[test]
    fn test_config_json_has_no_keys() {
        let mut settings = Settings::default();
        settings.model.api_key = Some("sk-secret".to_string());
        let json = serde_json::to_string_pretty(&settings).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("top_k"));
    }
}
