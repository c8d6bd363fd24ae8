//! Remote fetch from the tabular data API.
//!
//! One GET per resource, with the API key attached as a query parameter and
//! a bounded timeout. Transport failures and unexpected payload shapes are
//! logged and turned into an empty record list: a scheme whose source is
//! unreachable must not stop the other schemes from running.

mod payload;
mod retry;

use std::collections::BTreeMap;

use govdata_shared::{FetchConfig, GovDataError, RawRecord, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use payload::records_from_payload;
pub use retry::{RetryPolicy, with_retry};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

/// Maximum response size we accept (50 MB).
const MAX_RESPONSE_SIZE: u64 = 50 * 1024 * 1024;

/// Query parameter carrying the API credential.
const API_KEY_PARAM: &str = "api-key";

/// Query parameter carrying the resource identifier.
const RESOURCE_ID_PARAM: &str = "resource_id";

/// User-Agent string for source requests.
const USER_AGENT: &str = concat!("govdata/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Outcome of one extraction: the records, plus the failure that emptied
/// them, if any.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<RawRecord>,
    pub failure: Option<GovDataError>,
}

impl Extraction {
    /// Whether the record list is empty because something went wrong.
    pub fn is_degraded(&self) -> bool {
        self.failure.is_some()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the data API.
#[derive(Debug, Clone)]
pub struct DataGovClient {
    client: Client,
    config: FetchConfig,
    max_response_size: u64,
}

impl DataGovClient {
    /// Build a client with the configured timeout.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.timeout)
            .build()
            .map_err(|e| GovDataError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    /// Cap on the response body, in bytes.
    pub fn with_max_response_size(mut self, bytes: u64) -> Self {
        self.max_response_size = bytes;
        self
    }

    /// Fetch the records of one resource, degrading any failure to an empty list.
    pub async fn fetch(
        &self,
        resource_id: &str,
        params: &BTreeMap<String, String>,
    ) -> Vec<RawRecord> {
        self.extract(resource_id, params).await.records
    }

    /// Like [`fetch`](Self::fetch), but keeps the failure (already logged) for
    /// callers that report on it.
    #[instrument(skip_all, fields(resource_id = %resource_id))]
    pub async fn extract(
        &self,
        resource_id: &str,
        params: &BTreeMap<String, String>,
    ) -> Extraction {
        match self.try_fetch(resource_id, params).await {
            Ok(records) => {
                info!(count = records.len(), "extracted records");
                Extraction {
                    records,
                    failure: None,
                }
            }
            Err(err @ GovDataError::Shape { .. }) => {
                warn!(error = %err, "unexpected payload shape from source, treating as empty");
                Extraction {
                    records: Vec::new(),
                    failure: Some(err),
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch resource, treating as empty");
                Extraction {
                    records: Vec::new(),
                    failure: Some(err),
                }
            }
        }
    }

    /// Fetch and normalize, surfacing errors. Transport failures are retried
    /// according to the configured policy.
    pub async fn try_fetch(
        &self,
        resource_id: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Vec<RawRecord>> {
        let url = self.request_url(resource_id, params);
        let policy = RetryPolicy {
            retries: self.config.retries,
            delay: self.config.retry_delay,
        };

        let payload = with_retry(policy, "fetch", |attempt| {
            debug!(attempt, "requesting resource");
            self.fetch_once(&url)
        })
        .await?;

        records_from_payload(payload)
    }

    /// Compose the request URL. Per-call params override configured ones; the
    /// resource id and key always win.
    fn request_url(&self, resource_id: &str, params: &BTreeMap<String, String>) -> Url {
        let mut merged = self.config.params.clone();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.insert(RESOURCE_ID_PARAM.to_string(), resource_id.to_string());
        merged.insert(
            API_KEY_PARAM.to_string(),
            self.config.api_key.clone().unwrap_or_default(),
        );

        let mut url = self.config.base_url.clone();
        url.query_pairs_mut().extend_pairs(merged.iter());
        url
    }

    /// One GET, decoded as JSON.
    async fn fetch_once(&self, url: &Url) -> Result<Value> {
        // The URL carries the API key; log the path only.
        let target = url.path().to_string();

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| GovDataError::Network(format!("{target}: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GovDataError::Network(format!("{target}: HTTP {status}")));
        }

        let max = self.max_response_size;
        if response.content_length().is_some_and(|len| len > max) {
            return Err(GovDataError::ResponseTooLarge { max });
        }

        // Content-Length is absent on chunked bodies; count while reading.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            GovDataError::Network(format!("{target}: failed to read body: {}", e.without_url()))
        })? {
            if body.len() as u64 + chunk.len() as u64 > max {
                return Err(GovDataError::ResponseTooLarge { max });
            }
            body.extend_from_slice(&chunk);
        }

        serde_json::from_slice(&body)
            .map_err(|e| GovDataError::Network(format!("{target}: malformed JSON body: {e}")))
    }
}
