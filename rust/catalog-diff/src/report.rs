//! Fleet-wide aggregate reports.
//!
//! All counts, percentages and rankings are computed from one completed
//! outcome snapshot; nothing here recomputes after the fact. The serialized
//! report is the boundary consumed by external renderers.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cluster;
use crate::pool::Outcome;

pub const DEFAULT_CHANGED_DEPTH: usize = 10;

/// Per-node diff summary produced by the external differ. Only the two
/// ranking metrics are interpreted here; everything else the differ emits
/// is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeSummary {
    #[serde(default)]
    pub node_percentage: f64,

    #[serde(default)]
    pub node_differences: u64,

    #[serde(flatten)]
    pub detail: serde_json::Map<String, serde_json::Value>,
}

/// Aggregate view of one pull job.
#[derive(Debug, Clone, Serialize)]
pub struct PullReport {
    pub total_nodes: usize,
    pub compiled_nodes: Vec<String>,
    pub compiled_nodes_total: usize,
    pub failed_nodes: BTreeMap<String, String>,
    pub failed_nodes_total: usize,
    /// `None` (serialized `null`) when the fleet is empty.
    pub failed_percentage: Option<f64>,
    pub failed_to_compile_files: Vec<ClusterSummary>,
    pub example_compile_errors: Vec<ExampleError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub key: String,
    pub node_count: usize,
    pub nodes: Vec<String>,
}

/// One representative error per failure cluster, so the dominant failure
/// mode is readable without digging through logs.
#[derive(Debug, Clone, Serialize)]
pub struct ExampleError {
    pub node: String,
    pub error: String,
}

/// Aggregate view of one diff job.
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub nodes: BTreeMap<String, NodeDiffResult>,
    pub total_nodes: usize,
    pub with_changes: usize,
    /// Mean change percentage over the nodes with changes; `None`
    /// (serialized `null`) when no node changed.
    pub total_percentage: Option<f64>,
    pub most_changed: Vec<NodeMetric<f64>>,
    pub most_differences: Vec<NodeMetric<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull: Option<PullReport>,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum NodeDiffResult {
    Summary(NodeSummary),
    Failed { failed: String, stage: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NodeMetric<V> {
    pub node: String,
    pub value: V,
}

/// Builds the pull report from a completed outcome snapshot.
pub fn pull_report<T>(
    outcomes: &HashMap<String, Outcome<T>>,
    changed_depth: usize,
) -> PullReport {
    let total_nodes = outcomes.len();

    let mut compiled_nodes: Vec<String> = outcomes
        .iter()
        .filter(|(_, outcome)| outcome.is_success())
        .map(|(node, _)| node.clone())
        .collect();
    compiled_nodes.sort();

    let failed_nodes: BTreeMap<String, String> = outcomes
        .iter()
        .filter_map(|(node, outcome)| {
            outcome
                .failure()
                .map(|detail| (node.clone(), detail.message.clone()))
        })
        .collect();

    let failed_percentage = if total_nodes > 0 {
        Some(failed_nodes.len() as f64 / total_nodes as f64 * 100.0)
    } else {
        None
    };

    let ranked = cluster::cluster_failures(&failed_nodes);
    let top: Vec<_> = ranked.into_iter().take(changed_depth).collect();

    let example_compile_errors = top
        .iter()
        .filter_map(|cluster| {
            cluster.nodes.first().map(|node| ExampleError {
                node: node.clone(),
                error: failed_nodes.get(node).cloned().unwrap_or_default(),
            })
        })
        .collect();

    let failed_to_compile_files = top
        .into_iter()
        .map(|cluster| ClusterSummary {
            key: cluster.key,
            node_count: cluster.nodes.len(),
            nodes: cluster.nodes,
        })
        .collect();

    PullReport {
        total_nodes,
        compiled_nodes_total: compiled_nodes.len(),
        compiled_nodes,
        failed_nodes_total: failed_nodes.len(),
        failed_nodes,
        failed_percentage,
        failed_to_compile_files,
        example_compile_errors,
    }
}

/// Builds the diff report from a completed outcome snapshot, optionally
/// embedding the pull report that produced the compared artifacts.
pub fn diff_report(
    outcomes: &HashMap<String, Outcome<NodeSummary>>,
    changed_depth: usize,
    pull: Option<PullReport>,
) -> DiffReport {
    let total_nodes = outcomes.len();

    let with_changes: Vec<(&String, &NodeSummary)> = outcomes
        .iter()
        .filter_map(|(node, outcome)| outcome.success().map(|summary| (node, summary)))
        .filter(|(_, summary)| summary.node_percentage != 0.0)
        .collect();

    let total_percentage = if with_changes.is_empty() {
        None
    } else {
        let sum: f64 = with_changes
            .iter()
            .map(|(_, summary)| summary.node_percentage)
            .sum();
        Some(sum / with_changes.len() as f64)
    };

    let mut most_changed: Vec<NodeMetric<f64>> = with_changes
        .iter()
        .map(|(node, summary)| NodeMetric {
            node: (*node).clone(),
            value: summary.node_percentage,
        })
        .collect();
    most_changed.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.node.cmp(&b.node)));
    most_changed.truncate(changed_depth);

    let mut most_differences: Vec<NodeMetric<u64>> = with_changes
        .iter()
        .map(|(node, summary)| NodeMetric {
            node: (*node).clone(),
            value: summary.node_differences,
        })
        .collect();
    most_differences.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.node.cmp(&b.node)));
    most_differences.truncate(changed_depth);

    let nodes = outcomes
        .iter()
        .map(|(node, outcome)| {
            let result = match outcome {
                Outcome::Success(summary) => NodeDiffResult::Summary(summary.clone()),
                Outcome::Failed(detail) => NodeDiffResult::Failed {
                    failed: detail.message.clone(),
                    stage: detail.stage.as_str().to_string(),
                },
            };
            (node.clone(), result)
        })
        .collect();

    DiffReport {
        nodes,
        total_nodes,
        with_changes: with_changes.len(),
        total_percentage,
        most_changed,
        most_differences,
        pull,
        date: Utc::now().to_rfc3339(),
    }
}
