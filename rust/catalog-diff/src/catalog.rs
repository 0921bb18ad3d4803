//! Compiled catalog documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::hash::{Hash, Hasher};

/// A compiled configuration catalog for one node.
///
/// Equality and hashing are *semantic*: they cover tags, name, environment,
/// resources, edges and classes only. `version`, `code_id` and
/// `catalog_uuid` change run-to-run even when the configuration itself is
/// unchanged, so they never participate in comparison or dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tags: Vec<String>,

    pub name: String,

    #[serde(default)]
    pub version: Value,

    #[serde(default)]
    pub code_id: Option<String>,

    #[serde(default)]
    pub catalog_uuid: Option<String>,

    #[serde(default)]
    pub catalog_format: Option<i64>,

    #[serde(default)]
    pub environment: String,

    /// Ordered resource descriptors, kept as raw documents so unknown
    /// per-resource fields survive a serialize/parse round trip.
    #[serde(default)]
    pub resources: Vec<Value>,

    #[serde(default)]
    pub edges: Vec<Edge>,

    #[serde(default)]
    pub classes: Vec<String>,
}

/// Ordering relation between two resources in a catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

impl PartialEq for Catalog {
    fn eq(&self, other: &Self) -> bool {
        self.tags == other.tags
            && self.name == other.name
            && self.environment == other.environment
            && self.resources == other.resources
            && self.edges == other.edges
            && self.classes == other.classes
    }
}

// Resources come from parsed JSON documents, which cannot encode NaN, so
// the partial equality above is total in practice.
impl Eq for Catalog {}

impl Hash for Catalog {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tags.hash(state);
        self.name.hash(state);
        self.environment.hash(state);
        for resource in &self.resources {
            // serde_json renders object keys in sorted order, so equal
            // values always hash identically.
            resource.to_string().hash(state);
        }
        self.edges.hash(state);
        self.classes.hash(state);
    }
}

impl Catalog {
    /// Stable hex digest over the semantic-equality fields. Two catalogs
    /// that differ only in version, code_id or catalog_uuid share a digest.
    pub fn semantic_hash(&self) -> String {
        let view = serde_json::json!({
            "tags": self.tags,
            "name": self.name,
            "environment": self.environment,
            "resources": self.resources,
            "edges": self.edges,
            "classes": self.classes,
        });
        let mut hasher = Sha256::new();
        hasher.update(view.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}
