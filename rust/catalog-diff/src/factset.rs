//! Fact inventory records and the compile-submission codec.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// One fleet-database factset record, keyed by certname.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Factset {
    pub certname: String,

    #[serde(default)]
    pub timestamp: Option<String>,

    /// Nested facts document; the fleet database wraps the actual
    /// name/value pairs in a `data` array.
    #[serde(default)]
    pub facts: FactsDocument,

    #[serde(default)]
    pub hash: Option<String>,

    #[serde(default)]
    pub producer: Option<String>,

    #[serde(default)]
    pub producer_timestamp: Option<String>,

    #[serde(default)]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactsDocument {
    #[serde(default)]
    pub data: Vec<FactEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactEntry {
    pub name: String,
    pub value: Value,
}

impl Factset {
    /// Builds the submission document the compile endpoint expects: a flat
    /// name/value map with the reserved `trusted` key removed, stamped with
    /// the submission time and an expiration exactly one day later.
    ///
    /// Both timestamps derive from the single `now` instant, so the
    /// expiration invariant holds even if the clock moves mid-construction.
    pub fn to_submission(&self, now: DateTime<Utc>) -> FactSubmission {
        let mut values: Map<String, Value> = self
            .facts
            .data
            .iter()
            .map(|fact| (fact.name.clone(), fact.value.clone()))
            .collect();
        values.remove("trusted");

        FactSubmission {
            name: self.certname.clone(),
            values,
            timestamp: format_timestamp(now),
            expiration: format_timestamp(now + Duration::days(1)),
        }
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Ephemeral per-compile-request fact document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactSubmission {
    pub name: String,
    pub values: Map<String, Value>,
    pub timestamp: String,
    pub expiration: String,
}

impl FactSubmission {
    /// Serializes the submission and percent-encodes it twice in sequence.
    /// The compile endpoint decodes the `facts` form field twice before
    /// parsing, so a single pass hands it a payload it cannot decode.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(self).map_err(|source| Error::Encode {
            certname: self.name.clone(),
            source,
        })?;
        let once = urlencoding::encode(&json);
        Ok(urlencoding::encode(&once).into_owned())
    }
}
