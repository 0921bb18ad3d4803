//! Error types for the catalog pipeline.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage a failure is attributed to. Drives failure clustering
/// and the per-node failure breakdown in the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Fleet-database reads (factsets, stored catalogs, per-node facts).
    Inventory,
    /// Compile-endpoint transport or a service-reported compile failure.
    Compile,
    /// Response body was not a valid catalog document.
    Parse,
    /// Artifact write failed.
    Persist,
    /// External differ invocation failed.
    Diff,
    /// Worker panicked.
    Internal,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Inventory => "inventory",
            Stage::Compile => "compile",
            Stage::Parse => "parse",
            Stage::Persist => "persist",
            Stage::Diff => "diff",
            Stage::Internal => "internal",
        }
    }
}

/// Errors that can occur while pulling catalogs for a fleet.
#[derive(Error, Debug)]
pub enum Error {
    /// The bulk factset inventory could not be retrieved. Fatal to the run.
    #[error("error retrieving factsets from {server}: {message}")]
    FactsetRetrieval { server: String, message: String },

    /// A per-node fleet-database read failed.
    #[error("failed to retrieve {resource} for {certname} from {server}: {message}")]
    Retrieval {
        resource: &'static str,
        certname: String,
        server: String,
        message: String,
    },

    /// The compile endpoint could not be reached for a node.
    #[error("failed to compile catalog for {certname} on {server} in environment {environment}: {cause}")]
    Compile {
        certname: String,
        server: String,
        environment: String,
        cause: String,
    },

    /// The server answered, but the body was not a valid catalog document.
    /// `compile_failure` is set when the body carries the catalog-error
    /// marker of a service-reported compile failure.
    #[error("server {server} returned invalid catalog for {certname}: {cause}")]
    InvalidCatalog {
        certname: String,
        server: String,
        cause: String,
        compile_failure: bool,
    },

    /// An artifact could not be written.
    #[error("failed to save {certname}.{extension} in {directory}: {source}")]
    Persistence {
        certname: String,
        extension: String,
        directory: String,
        #[source]
        source: std::io::Error,
    },

    /// A fact submission could not be serialized.
    #[error("failed to encode fact submission for {certname}: {source}")]
    Encode {
        certname: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Pipeline stage this error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            Error::FactsetRetrieval { .. } | Error::Retrieval { .. } => Stage::Inventory,
            Error::Compile { .. } => Stage::Compile,
            Error::InvalidCatalog {
                compile_failure: true,
                ..
            } => Stage::Compile,
            Error::InvalidCatalog { .. } => Stage::Parse,
            Error::Persistence { .. } => Stage::Persist,
            Error::Encode { .. } => Stage::Parse,
        }
    }
}
