// src/ct_log/coordinator.rs
//! The shard pass driver.
//!
//! Walks every registered log's assigned index range one index at a time and
//! applies an explicit failure policy per error kind:
//!
//! - decode / certificate / publish failure: skip the entry, keep walking
//!   (the checkpoint tracks fetch success, not processing success)
//! - throttled response: write the audit marker, commit the last fetched
//!   success, abort this log for the pass
//! - network failure: abandon this log for the pass, no rollback
//! - checkpoint persistence failure: propagate; prior commits stand and the
//!   remaining logs still run

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::client::{FetchOutcome, LogClient};
use crate::audit::AuditSink;
use crate::cert::{self, CertError};
use crate::filter::SuffixFilter;
use crate::leaf::{self, EntryKind, LeafError};
use crate::queue::{MatchMessage, MatchSink};
use crate::state::{StateError, StateStore};

/// Pass-wide knobs, fixed at construction.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// This worker's shard identifier. At most one live invocation per
    /// shard id is a caller-side precondition.
    pub shard: u32,
    pub fetch_timeout: Duration,
    /// Successful fetches between periodic checkpoint commits.
    pub checkpoint_interval: u64,
}

/// Counters accumulated over one pass and logged at the end.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub logs_completed: u64,
    pub logs_skipped: u64,
    pub logs_throttled: u64,
    pub logs_abandoned: u64,
    pub logs_failed: u64,
    pub entries_fetched: u64,
    pub entries_skipped: u64,
    pub matches_emitted: u64,
}

/// Per-entry processing failure; always a skip, never an abort.
#[derive(Debug, Error)]
enum EntryError {
    #[error(transparent)]
    Leaf(#[from] LeafError),

    #[error(transparent)]
    Certificate(#[from] CertError),

    #[error("queue publish failed: {0}")]
    Publish(#[source] anyhow::Error),
}

/// How a log's range walk ended.
enum LogOutcome {
    Completed,
    Throttled,
    Abandoned,
}

/// Sequential pass driver: one log at a time, one index at a time. Scale-out
/// is external, via disjoint shard identifiers.
pub struct ShardCoordinator {
    settings: ScanSettings,
    state: Arc<dyn StateStore>,
    matches: Arc<dyn MatchSink>,
    audit: Arc<dyn AuditSink>,
    filter: SuffixFilter,
}

impl ShardCoordinator {
    pub fn new(
        settings: ScanSettings,
        state: Arc<dyn StateStore>,
        matches: Arc<dyn MatchSink>,
        audit: Arc<dyn AuditSink>,
        filter: SuffixFilter,
    ) -> Self {
        let settings = ScanSettings {
            checkpoint_interval: settings.checkpoint_interval.max(1),
            ..settings
        };

        Self {
            settings,
            state,
            matches,
            audit,
            filter,
        }
    }

    /// Run one pass over every registered log.
    ///
    /// Fails only if the log list itself cannot be read; per-log failures
    /// are absorbed into the stats so unaffected logs keep making progress.
    pub async fn run_pass(&self) -> Result<PassStats, StateError> {
        let log_urls = self.state.log_urls().await?;

        info!(
            "Starting pass: shard {}, {} registered logs, {} filter patterns",
            self.settings.shard,
            log_urls.len(),
            self.filter.pattern_count()
        );

        let mut stats = PassStats::default();

        for log_url in &log_urls {
            if let Err(e) = self.scan_log(log_url, &mut stats).await {
                error!(
                    "{}: checkpoint persistence failed, abandoning log for this pass: {}",
                    log_url, e
                );
                stats.logs_failed += 1;
            }
        }

        info!(
            "Pass complete: {} fetched, {} skipped, {} matches, {} logs throttled",
            stats.entries_fetched, stats.entries_skipped, stats.matches_emitted, stats.logs_throttled
        );

        Ok(stats)
    }

    /// Walk one log's assigned range. Returns `Err` only on checkpoint
    /// persistence failure; the last successfully persisted checkpoint
    /// remains valid in that case.
    async fn scan_log(&self, log_url: &str, stats: &mut PassStats) -> Result<(), StateError> {
        let shard = self.settings.shard;

        let Some(range) = self.state.shard_range(log_url, shard).await? else {
            debug!("{}: no range for shard {}, skipping", log_url, shard);
            stats.logs_skipped += 1;
            return Ok(());
        };

        if range.is_empty() {
            debug!(
                "{}: shard {} range {}..{} exhausted, skipping",
                log_url, shard, range.start, range.end
            );
            stats.logs_skipped += 1;
            return Ok(());
        }

        let client = match LogClient::new(log_url, self.settings.fetch_timeout) {
            Ok(client) => client,
            Err(e) => {
                warn!("{}: unusable log URL, skipping: {:?}", log_url, e);
                stats.logs_abandoned += 1;
                return Ok(());
            }
        };

        info!(
            "{}: scanning shard {} range {}..{}",
            log_url, shard, range.start, range.end
        );

        let mut last_success = range.start;
        let mut since_commit: u64 = 0;
        let mut outcome = LogOutcome::Completed;

        for index in range.start..range.end {
            match client.fetch_entry(index).await {
                Err(e) => {
                    warn!(
                        "{}: network failure at index {}, abandoning log for this pass: {}",
                        log_url, index, e
                    );
                    outcome = LogOutcome::Abandoned;
                    break;
                }
                Ok(FetchOutcome::Throttled) => {
                    let reference = client.entries_url(index);
                    if let Err(e) = self.audit.record_throttle(log_url, &reference).await {
                        warn!("{}: failed to write throttle marker: {:?}", log_url, e);
                    }
                    outcome = LogOutcome::Throttled;
                    break;
                }
                Ok(FetchOutcome::Leaf(bytes)) => {
                    match self.process_entry(&client, log_url, index, &bytes).await {
                        Ok(emitted) => {
                            if emitted {
                                stats.matches_emitted += 1;
                            }
                        }
                        Err(e) => {
                            warn!("{}: skipping entry {}: {}", log_url, index, e);
                            stats.entries_skipped += 1;
                        }
                    }

                    last_success = index;
                    stats.entries_fetched += 1;
                    since_commit += 1;

                    if since_commit >= self.settings.checkpoint_interval {
                        self.state.commit_start(log_url, shard, last_success).await?;
                        since_commit = 0;
                    }
                }
            }
        }

        // Unconditional final commit; on throttle this is the rollback to
        // the last fetched success.
        self.state.commit_start(log_url, shard, last_success).await?;

        match outcome {
            LogOutcome::Completed => {
                info!("{}: range complete, checkpoint at {}", log_url, last_success);
                stats.logs_completed += 1;
            }
            LogOutcome::Throttled => {
                info!(
                    "{}: throttled, checkpoint rolled back to {}",
                    log_url, last_success
                );
                stats.logs_throttled += 1;
            }
            LogOutcome::Abandoned => {
                stats.logs_abandoned += 1;
            }
        }

        Ok(())
    }

    /// Decode, inspect, filter, and emit one fetched leaf.
    /// Returns whether a match was emitted.
    async fn process_entry(
        &self,
        client: &LogClient,
        log_url: &str,
        index: u64,
        bytes: &[u8],
    ) -> Result<bool, EntryError> {
        let merkle_leaf = leaf::decode(bytes)?;

        if merkle_leaf.kind != EntryKind::Certificate {
            // Precert entries are recognized but never decoded further.
            debug!(
                "{}: entry {} is {:?}, not decoded",
                log_url, index, merkle_leaf.kind
            );
            return Ok(false);
        }

        let der = leaf::certificate_payload(merkle_leaf.payload)?;
        let names = cert::dns_names(der)?;

        let matched: Vec<String> = names
            .into_iter()
            .filter(|name| self.filter.matches(name))
            .collect();

        if matched.is_empty() {
            return Ok(false);
        }

        let message = MatchMessage {
            matched_names: matched,
            retrieval_reference: client.entries_url(index),
        };

        self.matches
            .publish(&message)
            .await
            .map_err(EntryError::Publish)?;

        let logged_at = chrono::DateTime::from_timestamp_millis(merkle_leaf.timestamp as i64)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| merkle_leaf.timestamp.to_string());

        info!(
            "{}: emitted {:?} from index {} (logged at {}, fingerprint {})",
            log_url,
            message.matched_names,
            index,
            logged_at,
            cert::fingerprint(der)
        );

        Ok(true)
    }
}
