// src/database/mod.rs
//! PostgreSQL-backed state store, for deployments where multiple shard
//! workers share one durable store instead of per-worker state files.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use crate::state::{ShardRange, StateError, StateStore};

pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StateError> {
        info!("Connecting to PostgreSQL state store");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL successfully");

        Ok(Self { pool })
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), StateError> {
        info!("Running state store migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ct_logs (
                url TEXT PRIMARY KEY
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shard_state (
                log_url TEXT NOT NULL REFERENCES ct_logs(url),
                shard INTEGER NOT NULL,
                start_index BIGINT NOT NULL,
                end_index BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (log_url, shard)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn log_urls(&self) -> Result<Vec<String>, StateError> {
        let rows = sqlx::query("SELECT url FROM ct_logs ORDER BY url")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row.get("url")).collect())
    }

    async fn shard_range(&self, log_url: &str, shard: u32) -> Result<Option<ShardRange>, StateError> {
        let row = sqlx::query(
            "SELECT start_index, end_index FROM shard_state WHERE log_url = $1 AND shard = $2",
        )
        .bind(log_url)
        .bind(shard as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ShardRange {
            start: row.get::<i64, _>("start_index") as u64,
            end: row.get::<i64, _>("end_index") as u64,
        }))
    }

    async fn commit_start(&self, log_url: &str, shard: u32, start: u64) -> Result<(), StateError> {
        let result = sqlx::query(
            "UPDATE shard_state SET start_index = $3, updated_at = NOW() \
             WHERE log_url = $1 AND shard = $2",
        )
        .bind(log_url)
        .bind(shard as i32)
        .bind(start as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StateError::UnknownShard {
                log_url: log_url.to_string(),
                shard,
            });
        }

        debug!("Committed checkpoint {} for {} shard {}", start, log_url, shard);
        Ok(())
    }

    async fn set_range(&self, log_url: &str, shard: u32, range: ShardRange) -> Result<(), StateError> {
        self.register_log(log_url).await?;

        sqlx::query(
            r#"
            INSERT INTO shard_state (log_url, shard, start_index, end_index)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (log_url, shard) DO UPDATE
                SET start_index = EXCLUDED.start_index,
                    end_index = EXCLUDED.end_index,
                    updated_at = NOW()
            "#,
        )
        .bind(log_url)
        .bind(shard as i32)
        .bind(range.start as i64)
        .bind(range.end as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn register_log(&self, log_url: &str) -> Result<(), StateError> {
        sqlx::query("INSERT INTO ct_logs (url) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(log_url)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
