// src/ct_log/client.rs
use anyhow::{Context, Result};
use base64::Engine;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{GetEntriesResponse, SignedTreeHead};

/// Outcome of fetching one index from a log's entries endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Raw Merkle leaf bytes, base64-decoded.
    Leaf(Vec<u8>),
    /// Any non-success status. Backpressure, not a hard error; the caller
    /// rolls back and retries on the next scheduled pass.
    Throttled,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    /// A success status with an unusable body (bad JSON, empty entries,
    /// undecodable base64). A broken endpoint rather than a broken entry.
    #[error("unusable response: {0}")]
    Response(String),
}

/// HTTP client for one log's RFC 6962 endpoints.
pub struct LogClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl LogClient {
    /// Create a client for `base_url` with a fixed request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url).with_context(|| format!("Invalid log URL {base_url}"))?;

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Entries URL requesting exactly `index`; doubles as the retrieval
    /// reference handed to downstream consumers.
    pub fn entries_url(&self, index: u64) -> String {
        format!(
            "{}/ct/v1/get-entries?start={index}&end={index}",
            self.base_url
        )
    }

    /// Fetch the single entry at `index`.
    pub async fn fetch_entry(&self, index: u64) -> Result<FetchOutcome, FetchError> {
        let url = self.entries_url(index);

        debug!("Fetching entry {} from {}", index, self.base_url);

        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            warn!(
                "{}: entry {} returned HTTP {}",
                self.base_url,
                index,
                response.status()
            );
            return Ok(FetchOutcome::Throttled);
        }

        let body: GetEntriesResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Response(format!("entries JSON: {e}")))?;

        let entry = body
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Response("empty entries array".to_string()))?;

        let leaf = base64::engine::general_purpose::STANDARD
            .decode(&entry.leaf_input)
            .map_err(|e| FetchError::Response(format!("leaf_input base64: {e}")))?;

        Ok(FetchOutcome::Leaf(leaf))
    }

    /// Get the signed tree head (current log size). Used when seeding scan
    /// boundaries, not by the scan pass itself.
    pub async fn get_sth(&self) -> Result<SignedTreeHead> {
        let url = format!("{}/ct/v1/get-sth", self.base_url);

        debug!("Fetching STH from {}", url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch STH")?;

        if !response.status().is_success() {
            anyhow::bail!("STH request failed with status {}", response.status());
        }

        let sth: SignedTreeHead = response.json().await.context("Failed to parse STH JSON")?;

        debug!(
            "STH received: tree_size={}, timestamp={}",
            sth.tree_size, sth.timestamp
        );

        Ok(sth)
    }
}
