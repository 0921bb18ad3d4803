//! The diff job: drive an external catalog differ over matched pairs of
//! pulled artifacts.
//!
//! The structural diff algorithm itself lives outside this crate, behind
//! [`CatalogDiffer`]; [`ExecDiffer`] adapts any executable that takes two
//! catalog paths and prints a JSON node summary.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::Stage;
use crate::pool::{self, FailureDetail, Outcome};
use crate::report::NodeSummary;

#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    pub content_diff: bool,
    pub show_resource_diff: bool,
    pub exclude_classes: bool,
}

/// Structural catalog comparison, consumed as a black box.
#[async_trait]
pub trait CatalogDiffer: Send + Sync {
    async fn diff(
        &self,
        old: &Path,
        new: &Path,
        options: &DiffOptions,
    ) -> anyhow::Result<NodeSummary>;
}

/// Runs an external diff program: `<program> <old> <new> [flags]`, reading
/// the node summary as JSON from stdout.
#[derive(Debug, Clone)]
pub struct ExecDiffer {
    program: PathBuf,
}

impl ExecDiffer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl CatalogDiffer for ExecDiffer {
    async fn diff(
        &self,
        old: &Path,
        new: &Path,
        options: &DiffOptions,
    ) -> anyhow::Result<NodeSummary> {
        let mut command = tokio::process::Command::new(&self.program);
        command.arg(old).arg(new);
        if options.content_diff {
            command.arg("--content-diff");
        }
        if options.show_resource_diff {
            command.arg("--show-resource-diff");
        }
        if options.exclude_classes {
            command.arg("--exclude-classes");
        }

        let output = command
            .output()
            .await
            .with_context(|| format!("failed to run differ {}", self.program.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "differ exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        serde_json::from_slice(&output.stdout).context("differ emitted an invalid node summary")
    }
}

/// A matched pair of persisted catalogs for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPair {
    pub certname: String,
    pub old_path: PathBuf,
    pub new_path: PathBuf,
}

/// Matches `<certname>.json` artifacts present in both directories.
/// Nodes that only produced a catalog on one side carry no pair to diff;
/// their failure is already visible in the pull report.
pub fn match_catalog_pairs(old_dir: &Path, new_dir: &Path) -> anyhow::Result<Vec<CatalogPair>> {
    let mut pairs = Vec::new();

    let entries = std::fs::read_dir(new_dir)
        .with_context(|| format!("failed to list catalog directory {}", new_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        // `<certname>.facts.json` artifacts live alongside catalogs.
        if stem.ends_with(".facts") {
            continue;
        }
        let old_path = old_dir.join(format!("{stem}.json"));
        if old_path.is_file() {
            pairs.push(CatalogPair {
                certname: stem.to_string(),
                old_path,
                new_path: path,
            });
        } else {
            debug!(certname = %stem, "no old catalog to diff against");
        }
    }

    pairs.sort_by(|a, b| a.certname.cmp(&b.certname));
    Ok(pairs)
}

/// Diffs every matched pair under the configured concurrency, isolating
/// per-node differ failures.
pub async fn run_diff_job(
    differ: Arc<dyn CatalogDiffer>,
    pairs: Vec<CatalogPair>,
    options: DiffOptions,
    concurrency: usize,
    shutdown: impl Future<Output = ()>,
) -> HashMap<String, Outcome<NodeSummary>> {
    info!(pairs = pairs.len(), "Diffing catalog pairs");

    let by_name: HashMap<String, CatalogPair> = pairs
        .into_iter()
        .map(|pair| (pair.certname.clone(), pair))
        .collect();
    let options = Arc::new(options);

    let keys: Vec<String> = by_name.keys().cloned().collect();
    pool::run_until(
        keys,
        concurrency,
        |certname| {
            let differ = Arc::clone(&differ);
            let options = Arc::clone(&options);
            let pair = by_name.get(&certname).cloned();
            async move {
                let pair = pair.ok_or_else(|| {
                    FailureDetail::new(Stage::Internal, format!("no catalog pair for {certname}"))
                })?;
                differ
                    .diff(&pair.old_path, &pair.new_path, &options)
                    .await
                    .map_err(|err| {
                        error!(certname = %certname, error = %err, "catalog diff failed");
                        FailureDetail::new(Stage::Diff, format!("{err:#}"))
                    })
            }
        },
        shutdown,
    )
    .await
}
