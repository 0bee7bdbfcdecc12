// src/queue.rs
//! Downstream queue for matched domains.
//!
//! Emission is fire-and-forget from the scanner's perspective: delivery
//! durability is the queue's contract, and a failed publish is just a
//! skipped entry for the pass.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Wire shape consumed by the downstream writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchMessage {
    /// Matched DNS names, in certificate order. Never empty.
    pub matched_names: Vec<String>,
    /// Single-index entries URL; re-fetching it returns the exact matched
    /// entry for audit.
    pub retrieval_reference: String,
}

/// Sink for matched certificates.
#[async_trait]
pub trait MatchSink: Send + Sync {
    async fn publish(&self, message: &MatchMessage) -> anyhow::Result<()>;
}

/// Redis queue configuration.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub url: String,
    /// Channel for real-time subscribers.
    pub channel: String,
    /// List the downstream writer drains; `None` disables the list push.
    pub queue_name: Option<String>,
    /// Older items are evicted past this size.
    pub max_queue_size: Option<i64>,
}

/// Redis-backed match sink: PUBLISH for live subscribers plus LPUSH to a
/// capped list for the durable consumer.
pub struct RedisQueue {
    settings: QueueSettings,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
}

impl RedisQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            connection: Arc::new(RwLock::new(None)),
        }
    }

    /// Connect and verify with a PING.
    pub async fn connect(&self) -> Result<(), redis::RedisError> {
        info!("Connecting to Redis...");

        let client = redis::Client::open(self.settings.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;

        let mut conn = manager.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;

        *self.connection.write().await = Some(manager);

        info!("Redis connected successfully");
        Ok(())
    }
}

#[async_trait]
impl MatchSink for RedisQueue {
    async fn publish(&self, message: &MatchMessage) -> anyhow::Result<()> {
        let conn_guard = self.connection.read().await;
        let mut conn = conn_guard
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Redis not connected"))?;
        drop(conn_guard);

        let payload = serde_json::to_string(message)?;

        let subscribers: i64 = conn.publish(&self.settings.channel, &payload).await?;
        debug!(
            "Published to channel {} ({} subscribers)",
            self.settings.channel, subscribers
        );

        if let Some(ref queue_name) = self.settings.queue_name {
            conn.lpush::<_, _, ()>(queue_name, &payload).await?;

            if let Some(max_size) = self.settings.max_queue_size {
                conn.ltrim::<_, ()>(queue_name, 0, (max_size - 1) as isize).await?;
            }

            debug!("Pushed to queue {}", queue_name);
        }

        Ok(())
    }
}
