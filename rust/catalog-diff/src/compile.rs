//! Compile-endpoint client and catalog response validation.

use std::path::Path;
use std::time::Duration;

use anyhow::Result as AnyResult;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::puppetdb::base_url;
use crate::store;

pub const DEFAULT_PORT: u16 = 8140;

/// A service-reported compile failure document. Bodies matching this are
/// genuine remote compile failures; anything else that fails to parse is a
/// transport or protocol anomaly.
static CATALOG_ERROR_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#".document_type.:.Catalog."#).expect("valid marker pattern"));

/// Cause text for oversized invalid bodies keeps a readable prefix plus a
/// digest of the whole payload.
const CAUSE_PREFIX_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct CompileClient {
    http: Client,
    server: String,
    base: String,
}

impl CompileClient {
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

    /// Compiles a fresh catalog from the doubly-encoded fact submission.
    ///
    /// The body is returned raw whatever the HTTP status: remote compile
    /// failures arrive as error-status documents whose classification
    /// happens in [`process_catalog_body`].
    pub async fn compile_catalog(
        &self,
        environment: &str,
        certname: &str,
        encoded_facts: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/puppet/v3/catalog/{certname}?environment={environment}",
            self.base
        );
        let data = format!("facts_format=pson&facts={encoded_facts}");

        debug!(certname = %certname, url = %url, "Requesting catalog compilation");

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(data)
            .send()
            .await
            .map_err(|e| Error::Compile {
                certname: certname.to_string(),
                server: self.server.clone(),
                environment: environment.to_string(),
                cause: e.to_string(),
            })?;

        response.text().await.map_err(|e| Error::Compile {
            certname: certname.to_string(),
            server: self.server.clone(),
            environment: environment.to_string(),
            cause: e.to_string(),
        })
    }
}

/// Validates a raw catalog response and persists it.
///
/// A parseable body is saved as `<certname>.json` and returned as a
/// [`Catalog`]. An unparseable body is still saved, as `<certname>.error`,
/// so failure forensics survive the run; the resulting error is classified
/// by the catalog-error marker.
pub async fn process_catalog_body(
    dir: &Path,
    server: &str,
    certname: &str,
    body: &str,
) -> Result<Catalog> {
    match serde_json::from_str::<Catalog>(body) {
        Ok(catalog) => {
            store::save_artifact(dir, certname, body, "json").await?;
            Ok(catalog)
        }
        Err(parse_err) => {
            error!(certname = %certname, server = %server, "Server returned invalid catalog");
            store::save_artifact(dir, certname, body, "error").await?;

            let (cause, compile_failure) = classify_invalid_body(body, &parse_err);
            Err(Error::InvalidCatalog {
                certname: certname.to_string(),
                server: server.to_string(),
                cause,
                compile_failure,
            })
        }
    }
}

/// Classifies an invalid catalog body: the embedded error message for
/// marker-matched compile failures, the (possibly truncated) body itself
/// for everything else.
fn classify_invalid_body(body: &str, parse_err: &serde_json::Error) -> (String, bool) {
    if CATALOG_ERROR_MARKER.is_match(body) {
        let cause = embedded_message(body).unwrap_or_else(|| parse_err.to_string());
        (cause, true)
    } else {
        (truncate_cause(body), false)
    }
}

fn embedded_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

fn truncate_cause(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= CAUSE_PREFIX_LIMIT {
        return trimmed.to_string();
    }
    let mut cut = CAUSE_PREFIX_LIMIT;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    let digest = hex::encode(Sha256::digest(trimmed.as_bytes()));
    format!("{}... [sha256:{}]", &trimmed[..cut], &digest[..16])
}
