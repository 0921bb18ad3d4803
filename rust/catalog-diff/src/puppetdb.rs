//! Fleet-database client: bulk factset inventory, stored catalogs and
//! per-node fact documents.

use std::time::Duration;

use anyhow::Result as AnyResult;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};
use crate::factset::Factset;

pub const DEFAULT_PORT: u16 = 8081;

#[derive(Debug, Clone)]
pub struct PuppetDbClient {
    http: Client,
    server: String,
    base: String,
}

impl PuppetDbClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> AnyResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            server: host.to_string(),
            base: base_url(host, port),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Single bulk query for every factset the fleet database holds. There
    /// is no pagination and no retry: without a complete inventory there is
    /// nothing meaningful to run against.
    pub async fn factsets(&self) -> Result<Vec<Factset>> {
        let url = format!("{}/pdb/query/v4/factsets", self.base);
        debug!(url = %url, "Fetching factset inventory");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::FactsetRetrieval {
                server: self.server.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::FactsetRetrieval {
            server: self.server.clone(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(Error::FactsetRetrieval {
                server: self.server.clone(),
                message: format!("status {status}: {body}"),
            });
        }

        let factsets: Vec<Factset> =
            serde_json::from_str(&body).map_err(|e| Error::FactsetRetrieval {
                server: self.server.clone(),
                message: format!("invalid factset response: {e}"),
            })?;

        debug!(count = factsets.len(), server = %self.server, "Retrieved factsets");
        Ok(factsets)
    }

    /// Reads a previously stored catalog for one node. The body is returned
    /// raw whatever the status: error documents carry the catalog-error
    /// marker and are classified downstream.
    pub async fn stored_catalog(&self, certname: &str) -> Result<String> {
        let url = format!("{}/pdb/query/v4/catalogs/{certname}", self.base);
        debug!(certname = %certname, url = %url, "Fetching stored catalog");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.retrieval_error("catalog", certname, e))?;

        response
            .text()
            .await
            .map_err(|e| self.retrieval_error("catalog", certname, e))
    }

    /// Reads the raw fact document for one node.
    pub async fn node_facts(&self, certname: &str) -> Result<String> {
        let query = format!("[\"=\", \"certname\", \"{certname}\"]");
        let url = format!(
            "{}/pdb/query/v4/facts?query={}",
            self.base,
            urlencoding::encode(&query)
        );
        debug!(certname = %certname, url = %url, "Fetching node facts");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.retrieval_error("facts", certname, e))?;

        response
            .text()
            .await
            .map_err(|e| self.retrieval_error("facts", certname, e))
    }

    fn retrieval_error(
        &self,
        resource: &'static str,
        certname: &str,
        err: reqwest::Error,
    ) -> Error {
        Error::Retrieval {
            resource,
            certname: certname.to_string(),
            server: self.server.clone(),
            message: err.to_string(),
        }
    }
}

/// Ensure the host carries a scheme and the expected port.
pub(crate) fn base_url(host: &str, port: u16) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}
