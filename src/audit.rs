// src/audit.rs
//! Throttle audit markers.
//!
//! When a log throttles the pass, one marker object per log is written for
//! manual follow-up. The scanner never reads these back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Marker describing the position abandoned on throttle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrottleMarker {
    /// Entries URL for the index the pass gave up at.
    pub retrieval_reference: String,
    pub retry_exceeded: bool,
}

/// Write-only sink for throttle markers.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record (overwriting any previous marker for this log) that the pass
    /// abandoned `reference` because the log throttled.
    async fn record_throttle(&self, log_url: &str, reference: &str) -> anyhow::Result<()>;
}

/// Directory-backed audit sink: one `<sanitized-log-url>.json` per log.
pub struct DirAuditSink {
    dir: PathBuf,
}

impl DirAuditSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Log URLs contain slashes and colons; flatten to a filesystem-safe name.
    fn file_name(log_url: &str) -> String {
        let sanitized: String = log_url
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        format!("{sanitized}.json")
    }
}

#[async_trait]
impl AuditSink for DirAuditSink {
    async fn record_throttle(&self, log_url: &str, reference: &str) -> anyhow::Result<()> {
        let marker = ThrottleMarker {
            retrieval_reference: reference.to_string(),
            retry_exceeded: true,
        };

        fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(Self::file_name(log_url));
        let temp_path = path.with_extension("json.tmp");

        fs::write(&temp_path, serde_json::to_vec_pretty(&marker)?).await?;
        fs::rename(&temp_path, &path).await?;

        debug!("Throttle marker written to {:?}", path);
        Ok(())
    }
}
