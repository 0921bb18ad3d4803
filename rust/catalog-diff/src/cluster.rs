//! Groups per-node failures by inferred root cause.
//!
//! The cause inference is a text heuristic over captured error messages.
//! It is deliberately confined to [`classify_error`] so it can be swapped
//! without touching the orchestration or reporting around it.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// A path-like token ending in a known source-file extension.
static SOURCE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\S*(/\S*\.pp|\.erb))").expect("valid source-file pattern"));

/// A group of node failures sharing an inferred common root cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub key: String,
    /// Member nodes, ascending.
    pub nodes: Vec<String>,
}

/// Infers the cluster key for one failure.
///
/// A resource-file reference in the error text wins; otherwise the key is a
/// digest of the message with every occurrence of the node's own name
/// removed, so two nodes hitting the same error under different names land
/// in one cluster.
pub fn classify_error(node: &str, message: &str) -> String {
    if let Some(captures) = SOURCE_FILE.captures(message) {
        return captures[1].to_string();
    }
    let scrubbed = if node.is_empty() {
        message.to_string()
    } else {
        message.replace(node, "")
    };
    let digest = hex::encode(Sha256::digest(scrubbed.as_bytes()));
    format!("No-path-in-error-{digest}")
}

/// Clusters failures by [`classify_error`] key, ranked by member count
/// descending; ties break on key order so the ranking is stable run to run.
pub fn cluster_failures(failures: &BTreeMap<String, String>) -> Vec<Cluster> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (node, message) in failures {
        grouped
            .entry(classify_error(node, message))
            .or_default()
            .push(node.clone());
    }

    let mut clusters: Vec<Cluster> = grouped
        .into_iter()
        .map(|(key, nodes)| Cluster { key, nodes })
        .collect();
    clusters.sort_by(|a, b| {
        b.nodes
            .len()
            .cmp(&a.nodes.len())
            .then_with(|| a.key.cmp(&b.key))
    });
    clusters
}
