//! The pull job: compile every node's catalog on both servers and persist
//! the results.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::compile::{self, CompileClient};
use crate::error::{Result, Stage};
use crate::factset::Factset;
use crate::pool::{self, FailureDetail, Outcome};
use crate::puppetdb::PuppetDbClient;
use crate::report::{self, PullReport};
use crate::store;

/// One compile-server target, `host[/environment]`. The host may carry an
/// explicit scheme; the environment defaults to `production`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub host: String,
    pub environment: String,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid server spec: {0}")]
pub struct ParseServerError(String);

impl FromStr for ServerSpec {
    type Err = ParseServerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (scheme, rest) = if let Some(rest) = s.strip_prefix("https://") {
            ("https://", rest)
        } else if let Some(rest) = s.strip_prefix("http://") {
            ("http://", rest)
        } else {
            ("", s)
        };

        let (host, environment) = match rest.split_once('/') {
            Some((host, env)) => (host, Some(env)),
            None => (rest, None),
        };
        if host.trim().is_empty() {
            return Err(ParseServerError("server host must not be empty".to_string()));
        }

        Ok(Self {
            host: format!("{scheme}{}", host.trim()),
            environment: environment
                .filter(|env| !env.is_empty())
                .unwrap_or("production")
                .to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PullSettings {
    pub old_server: ServerSpec,
    pub new_server: ServerSpec,
    pub old_dir: PathBuf,
    pub new_dir: PathBuf,
    pub threads: usize,
    pub changed_depth: usize,
    pub timeout: Duration,
    pub puppetdb_port: u16,
    pub compile_port: u16,
    /// Externally selected candidate nodes; `None` means the whole
    /// factset inventory.
    pub nodes: Option<Vec<String>>,
    /// Read the old side from stored catalogs instead of compiling.
    pub stored_old: bool,
    /// Also persist each node's raw fact document next to the old catalogs.
    pub save_facts: bool,
}

/// Successful pull payload: where both catalog artifacts landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledNode {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
}

enum CatalogSource {
    Compile(CompileClient),
    Stored(PuppetDbClient),
}

impl CatalogSource {
    async fn fetch(&self, environment: &str, certname: &str, encoded_facts: &str) -> Result<String> {
        match self {
            CatalogSource::Compile(client) => {
                client.compile_catalog(environment, certname, encoded_facts).await
            }
            CatalogSource::Stored(client) => client.stored_catalog(certname).await,
        }
    }

    fn server(&self) -> &str {
        match self {
            CatalogSource::Compile(client) => client.server(),
            CatalogSource::Stored(client) => client.server(),
        }
    }
}

struct CatalogSide {
    source: CatalogSource,
    environment: String,
    dir: PathBuf,
}

struct PullContext {
    puppetdb: PuppetDbClient,
    old: CatalogSide,
    new: CatalogSide,
    save_facts: bool,
}

/// Runs the pull job: fetch the factset inventory (fatal on failure), then
/// compile and persist both catalogs for every node under the configured
/// concurrency, and aggregate the outcome snapshot into a report.
///
/// Per-node failures never abort the run; when `shutdown` resolves early
/// the report is built from the partial outcome map.
pub async fn run_pull(
    settings: PullSettings,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<PullReport> {
    let (report, _) = run_pull_with_outcomes(settings, shutdown).await?;
    Ok(report)
}

/// [`run_pull`] variant that also exposes the raw outcome map, for callers
/// that chain another job (diffing) off the pulled artifacts.
pub async fn run_pull_with_outcomes(
    settings: PullSettings,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<(PullReport, HashMap<String, Outcome<PulledNode>>)> {
    let puppetdb = PuppetDbClient::new(
        &settings.old_server.host,
        settings.puppetdb_port,
        settings.timeout,
    )?;

    let old_source = if settings.stored_old {
        CatalogSource::Stored(puppetdb.clone())
    } else {
        CatalogSource::Compile(CompileClient::new(
            &settings.old_server.host,
            settings.compile_port,
            settings.timeout,
        )?)
    };
    let new_source = CatalogSource::Compile(CompileClient::new(
        &settings.new_server.host,
        settings.compile_port,
        settings.timeout,
    )?);

    let factsets = puppetdb.factsets().await?;

    let by_name: HashMap<String, Factset> = factsets
        .into_iter()
        .filter(|factset| match &settings.nodes {
            Some(nodes) => nodes.iter().any(|n| n == &factset.certname),
            None => true,
        })
        .map(|factset| (factset.certname.clone(), factset))
        .collect();

    info!(
        total_nodes = by_name.len(),
        old_server = %settings.old_server.host,
        new_server = %settings.new_server.host,
        "Pulling catalogs"
    );

    let ctx = Arc::new(PullContext {
        puppetdb,
        old: CatalogSide {
            source: old_source,
            environment: settings.old_server.environment.clone(),
            dir: settings.old_dir.clone(),
        },
        new: CatalogSide {
            source: new_source,
            environment: settings.new_server.environment.clone(),
            dir: settings.new_dir.clone(),
        },
        save_facts: settings.save_facts,
    });

    let keys: Vec<String> = by_name.keys().cloned().collect();
    let outcomes = pool::run_until(
        keys,
        settings.threads,
        |certname| {
            let ctx = Arc::clone(&ctx);
            let factset = by_name.get(&certname).cloned();
            async move {
                let factset = factset.ok_or_else(|| {
                    FailureDetail::new(Stage::Internal, format!("no factset for {certname}"))
                })?;
                pull_node(ctx, factset).await.map_err(|err| {
                    error!(certname = %certname, error = %err, "catalog pull failed");
                    FailureDetail::from(err)
                })
            }
        },
        shutdown,
    )
    .await;

    let report = report::pull_report(&outcomes, settings.changed_depth);
    Ok((report, outcomes))
}

/// Pulls both catalogs for one node. The two sides run concurrently and
/// both complete before the outcome is decided; when both fail, the old
/// side's error is reported.
async fn pull_node(ctx: Arc<PullContext>, factset: Factset) -> Result<PulledNode> {
    let certname = factset.certname.clone();
    let submission = factset.to_submission(Utc::now());
    let encoded = submission.encode()?;

    debug!(certname = %certname, "Pulling catalogs for node");

    if ctx.save_facts {
        save_node_facts(&ctx, &certname).await?;
    }

    let (old, new) = tokio::join!(
        fetch_and_store(&ctx.old, &certname, &encoded),
        fetch_and_store(&ctx.new, &certname, &encoded),
    );

    let old_path = old?;
    let new_path = new?;
    Ok(PulledNode { old_path, new_path })
}

async fn fetch_and_store(side: &CatalogSide, certname: &str, encoded_facts: &str) -> Result<PathBuf> {
    let body = side
        .source
        .fetch(&side.environment, certname, encoded_facts)
        .await?;
    compile::process_catalog_body(&side.dir, side.source.server(), certname, &body).await?;
    Ok(store::artifact_path(&side.dir, certname, "json"))
}

/// Persists the node's raw fact document next to the old catalogs:
/// `<certname>.facts.json` when parseable, `<certname>.facts.error`
/// otherwise.
async fn save_node_facts(ctx: &PullContext, certname: &str) -> Result<()> {
    let facts = ctx.puppetdb.node_facts(certname).await?;
    let extension = if serde_json::from_str::<serde_json::Value>(&facts).is_ok() {
        "facts.json"
    } else {
        error!(certname = %certname, "Server returned invalid facts");
        "facts.error"
    };
    store::save_artifact(&ctx.old.dir, certname, &facts, extension).await?;
    Ok(())
}
