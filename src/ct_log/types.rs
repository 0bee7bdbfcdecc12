// src/ct_log/types.rs
use serde::{Deserialize, Serialize};

/// Response from a log's get-sth endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTreeHead {
    pub tree_size: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub sha256_root_hash: String,
    #[serde(default)]
    pub tree_head_signature: String,
}

/// Single entry from a log's get-entries endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// base64-encoded Merkle leaf blob
    pub leaf_input: String,
    /// base64-encoded chain data; carried on the wire, unused here
    #[serde(default)]
    pub extra_data: String,
}

/// Response wrapper for the get-entries endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetEntriesResponse {
    pub entries: Vec<LogEntry>,
}

/// Google's CT log list V3 format, reduced to the fields the importer reads.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogListV3 {
    pub operators: Vec<Operator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    #[serde(default)]
    pub logs: Vec<LogInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub state: Option<StateWrapper>,
}

/// Log lifecycle state; exactly one field is populated per log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateWrapper {
    #[serde(default)]
    pub usable: Option<StateTimestamp>,
    #[serde(default)]
    pub qualified: Option<StateTimestamp>,
    #[serde(default)]
    pub readonly: Option<StateTimestamp>,
    #[serde(default)]
    pub pending: Option<StateTimestamp>,
    #[serde(default)]
    pub retired: Option<StateTimestamp>,
    #[serde(default)]
    pub rejected: Option<StateTimestamp>,
}

impl StateWrapper {
    /// Actively accepting new entries.
    pub fn is_usable(&self) -> bool {
        self.usable.is_some() || self.qualified.is_some()
    }

    /// Frozen, but recent entries may still be unscanned.
    pub fn is_readonly(&self) -> bool {
        self.readonly.is_some()
    }

    /// Announced but not yet in service.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether this log should be registered, given importer settings.
    pub fn is_acceptable(&self, include_readonly: bool, include_pending: bool) -> bool {
        self.is_usable()
            || (include_readonly && self.is_readonly())
            || (include_pending && self.is_pending())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTimestamp {
    pub timestamp: String,
}
