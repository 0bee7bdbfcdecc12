// src/config.rs

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log_list: LogListConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default)]
    pub shard: u32,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_fetch_timeout_secs() -> u64 { 5 }
fn default_checkpoint_interval() -> u64 { 100 }
fn default_state_file() -> String { "ct-sweep-state.toml".to_string() }

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            shard: 0,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            checkpoint_interval: default_checkpoint_interval(),
            state_file: default_state_file(),
        }
    }
}

/// Watched base domains plus the external suffix-token table.
#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default)]
    pub base_domains: Vec<String>,
    /// Inline token list; takes precedence over `suffix_file` when set.
    #[serde(default)]
    pub suffix_tokens: Option<Vec<String>>,
    #[serde(default = "default_suffix_file")]
    pub suffix_file: String,
}

fn default_suffix_file() -> String { "suffixes.txt".to_string() }

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            base_domains: Vec::new(),
            suffix_tokens: None,
            suffix_file: default_suffix_file(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_queue_url")]
    pub url: String,
    #[serde(default = "default_queue_channel")]
    pub channel: String,
    #[serde(default = "default_queue_name")]
    pub queue_name: Option<String>,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: Option<i64>,
}

fn default_queue_url() -> String { "redis://localhost:6379".to_string() }
fn default_queue_channel() -> String { "ct-sweep:matches".to_string() }
fn default_queue_name() -> Option<String> { Some("ct-sweep:match_queue".to_string()) }
fn default_max_queue_size() -> Option<i64> { Some(10000) }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_queue_url(),
            channel: default_queue_channel(),
            queue_name: default_queue_name(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_audit_dir")]
    pub dir: String,
}

fn default_audit_dir() -> String { "throttled".to_string() }

impl Default for AuditConfig {
    fn default() -> Self {
        Self { dir: default_audit_dir() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub enabled: bool,
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String { "postgresql://localhost/ctsweep".to_string() }
fn default_max_connections() -> u32 { 20 }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogListConfig {
    #[serde(default = "default_log_list_url")]
    pub url: String,
    #[serde(default)]
    pub include_readonly: bool,
    #[serde(default)]
    pub include_pending: bool,
}

fn default_log_list_url() -> String {
    "https://www.gstatic.com/ct/log_list/v3/all_logs_list.json".to_string()
}

impl Default for LogListConfig {
    fn default() -> Self {
        Self {
            url: default_log_list_url(),
            include_readonly: false,
            include_pending: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}
