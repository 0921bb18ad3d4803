pub mod catalog;
pub mod cli;
pub mod cluster;
pub mod compile;
pub mod diff;
pub mod error;
pub mod factset;
pub mod pool;
pub mod pull;
pub mod puppetdb;
pub mod report;
pub mod store;
pub mod telemetry;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::cli::{Cli, Command, DiffArgs, PullArgs};
use crate::diff::ExecDiffer;

/// Bootstraps the tool from command-line arguments.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Pull(args) => run_pull_command(args).await,
        Command::Diff(args) => run_diff_command(args).await,
    }
}

async fn run_pull_command(args: PullArgs) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.old_dir)?;
    std::fs::create_dir_all(&args.new_dir)?;

    let report = pull::run_pull(args.settings(), shutdown_signal()).await?;
    emit_report(&report, args.output_report.as_deref())
}

async fn run_diff_command(args: DiffArgs) -> anyhow::Result<()> {
    let old_dir = ephemeral_catalog_dir(&args.old_server.host)?;
    let new_dir = ephemeral_catalog_dir(&args.new_server.host)?;

    let (pull_report, _) =
        pull::run_pull_with_outcomes(args.settings(old_dir.path(), new_dir.path()), shutdown_signal())
            .await?;

    let pairs = diff::match_catalog_pairs(old_dir.path(), new_dir.path())?;
    let differ = Arc::new(ExecDiffer::new(&args.differ));
    let outcomes = diff::run_diff_job(
        differ,
        pairs,
        args.diff_options(),
        args.tuning.threads,
        shutdown_signal(),
    )
    .await;

    let report = report::diff_report(&outcomes, args.tuning.changed_depth, Some(pull_report));
    emit_report(&report, args.output_report.as_deref())
}

fn ephemeral_catalog_dir(host: &str) -> std::io::Result<tempfile::TempDir> {
    let prefix: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    tempfile::Builder::new().prefix(&format!("{prefix}-")).tempdir()
}

fn emit_report<T: Serialize>(report: &T, output_path: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    if let Some(path) = output_path {
        info!(path = %path.display(), "Writing report to disk");
        std::fs::write(path, &json)?;
    }
    println!("{json}");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
