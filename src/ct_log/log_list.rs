// src/ct_log/log_list.rs
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info};

use super::types::LogListV3;

/// Fetches and filters the public CT log list for the importer.
pub struct LogListFetcher {
    http_client: reqwest::Client,
}

impl LogListFetcher {
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http_client })
    }

    /// Fetch the v3 log list and return the URLs worth registering.
    ///
    /// Usable (and qualified) logs are always included; readonly and pending
    /// logs only when asked for. Logs without a state block are skipped.
    pub async fn fetch_usable_logs(
        &self,
        list_url: &str,
        include_readonly: bool,
        include_pending: bool,
    ) -> Result<Vec<String>> {
        info!("Fetching CT log list from {}", list_url);

        let response = self
            .http_client
            .get(list_url)
            .send()
            .await
            .context("Failed to fetch CT log list")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch log list: HTTP {}", response.status());
        }

        let log_list: LogListV3 = response
            .json()
            .await
            .context("Failed to parse log list JSON")?;

        let mut acceptable_logs = Vec::new();

        for operator in &log_list.operators {
            for log in &operator.logs {
                if log.url.is_empty() {
                    continue;
                }

                let acceptable = match &log.state {
                    Some(state) => state.is_acceptable(include_readonly, include_pending),
                    None => false,
                };

                if acceptable {
                    debug!("Found log: {} ({})", log.description, log.url);
                    acceptable_logs.push(log.url.clone());
                }
            }
        }

        info!(
            "Found {} acceptable CT logs (readonly={}, pending={})",
            acceptable_logs.len(),
            include_readonly,
            include_pending
        );

        Ok(acceptable_logs)
    }
}
