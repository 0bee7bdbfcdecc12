// src/state.rs
//! Durable shard-scan state.
//!
//! Every (log, shard) pair owns a `ShardRange`; the committed checkpoint is
//! the range's `start`. Records are keyed by shard identifier, never by
//! composed field names.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Index range `[start, end)` assigned to one shard for one log.
/// `start` doubles as the committed checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRange {
    pub start: u64,
    pub end: u64,
}

impl ShardRange {
    /// An exhausted or unseeded range scans nothing.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("state encoding: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("state parsing: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no shard {shard} recorded for {log_url}")]
    UnknownShard { log_url: String, shard: u32 },

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable key/value store for log registration and per-shard scan state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Enumerate every registered log URL (full scan, once per pass).
    async fn log_urls(&self) -> Result<Vec<String>, StateError>;

    /// Point read of one shard's range. `None` if the log has no record for
    /// this shard.
    async fn shard_range(&self, log_url: &str, shard: u32) -> Result<Option<ShardRange>, StateError>;

    /// Commit a checkpoint: update only the `start` field of an existing
    /// shard record. Fails with [`StateError::UnknownShard`] if the record
    /// was never seeded.
    async fn commit_start(&self, log_url: &str, shard: u32, start: u64) -> Result<(), StateError>;

    /// Replace (or create) a shard's full range. Used by the seeder.
    async fn set_range(&self, log_url: &str, shard: u32, range: ShardRange) -> Result<(), StateError>;

    /// Register a log URL with no shard records yet. Idempotent.
    async fn register_log(&self, log_url: &str) -> Result<(), StateError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    logs: BTreeMap<String, LogState>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LogState {
    #[serde(default)]
    shards: BTreeMap<String, ShardRange>,
}

/// TOML-file state store.
///
/// Commits rewrite the whole file through a temporary file plus rename, so a
/// crash mid-write leaves the previous checkpoint intact.
pub struct FileStateStore {
    path: PathBuf,
    state: Arc<Mutex<StateFile>>,
}

impl FileStateStore {
    /// Open the store, loading existing state if the file is present.
    pub async fn open(path: PathBuf) -> Result<Self, StateError> {
        let state = if fs::try_exists(&path).await? {
            let contents = fs::read_to_string(&path).await?;
            let loaded: StateFile = toml::from_str(&contents)?;
            info!("Loaded scan state for {} logs from {:?}", loaded.logs.len(), path);
            loaded
        } else {
            info!("State file {:?} does not exist, starting fresh", path);
            StateFile::default()
        };

        Ok(Self {
            path,
            state: Arc::new(Mutex::new(state)),
        })
    }

    async fn save(&self, state: &StateFile) -> Result<(), StateError> {
        let toml_string = toml::to_string(state)?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, toml_string).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!("State saved to {:?}", self.path);
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn log_urls(&self) -> Result<Vec<String>, StateError> {
        let state = self.state.lock().await;
        Ok(state.logs.keys().cloned().collect())
    }

    async fn shard_range(&self, log_url: &str, shard: u32) -> Result<Option<ShardRange>, StateError> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .get(log_url)
            .and_then(|log| log.shards.get(&shard.to_string()))
            .copied())
    }

    async fn commit_start(&self, log_url: &str, shard: u32, start: u64) -> Result<(), StateError> {
        let mut state = self.state.lock().await;

        let range = state
            .logs
            .get_mut(log_url)
            .and_then(|log| log.shards.get_mut(&shard.to_string()))
            .ok_or_else(|| StateError::UnknownShard {
                log_url: log_url.to_string(),
                shard,
            })?;
        range.start = start;

        self.save(&state).await
    }

    async fn set_range(&self, log_url: &str, shard: u32, range: ShardRange) -> Result<(), StateError> {
        let mut state = self.state.lock().await;

        state
            .logs
            .entry(log_url.to_string())
            .or_default()
            .shards
            .insert(shard.to_string(), range);

        self.save(&state).await
    }

    async fn register_log(&self, log_url: &str) -> Result<(), StateError> {
        let mut state = self.state.lock().await;
        state.logs.entry(log_url.to_string()).or_default();
        self.save(&state).await
    }
}
