// src/main.rs
use anyhow::Context;
use clap::Parser;
use ct_sweep::audit::DirAuditSink;
use ct_sweep::cli::{Cli, Command};
use ct_sweep::config::Config;
use ct_sweep::ct_log::{LogClient, LogListFetcher, ScanSettings, ShardCoordinator};
use ct_sweep::database::PostgresStateStore;
use ct_sweep::filter::SuffixFilter;
use ct_sweep::queue::{QueueSettings, RedisQueue};
use ct_sweep::state::{FileStateStore, ShardRange, StateStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    let mut config = Config::from_file(Path::new(&cli.config))?;

    if let Some(shard) = cli.shard {
        config.scan.shard = shard;
    }

    let log_level = cli.log_level().unwrap_or(config.logging.level.as_str());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!("Starting ct-sweep...");

    let state = build_state_store(&config).await?;

    match cli.command.unwrap_or(Command::Scan) {
        Command::Scan => run_scan(&config, state).await,
        Command::ImportLogs => import_logs(&config, state.as_ref()).await,
        Command::Seed { shards } => seed_shards(&config, state.as_ref(), shards).await,
    }
}

async fn build_state_store(config: &Config) -> anyhow::Result<Arc<dyn StateStore>> {
    if config.database.enabled {
        let store =
            PostgresStateStore::connect(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to PostgreSQL state store")?;
        store.migrate().await?;
        Ok(Arc::new(store))
    } else {
        let store = FileStateStore::open(PathBuf::from(&config.scan.state_file))
            .await
            .context("Failed to open state file")?;
        Ok(Arc::new(store))
    }
}

/// Construct the collaborators once, run one pass, report.
async fn run_scan(config: &Config, state: Arc<dyn StateStore>) -> anyhow::Result<()> {
    if config.watch.base_domains.is_empty() {
        anyhow::bail!("No base domains configured under [watch]");
    }

    let tokens = match &config.watch.suffix_tokens {
        Some(tokens) => tokens.clone(),
        None => SuffixFilter::load_tokens(Path::new(&config.watch.suffix_file))?,
    };

    let filter = SuffixFilter::new(&config.watch.base_domains, &tokens);
    if filter.pattern_count() == 0 {
        anyhow::bail!("Suffix filter is empty; nothing to watch");
    }

    let queue = RedisQueue::new(QueueSettings {
        url: config.queue.url.clone(),
        channel: config.queue.channel.clone(),
        queue_name: config.queue.queue_name.clone(),
        max_queue_size: config.queue.max_queue_size,
    });
    queue
        .connect()
        .await
        .context("Failed to connect to Redis queue")?;

    let audit = DirAuditSink::new(PathBuf::from(&config.audit.dir));

    let coordinator = ShardCoordinator::new(
        ScanSettings {
            shard: config.scan.shard,
            fetch_timeout: Duration::from_secs(config.scan.fetch_timeout_secs),
            checkpoint_interval: config.scan.checkpoint_interval,
        },
        state,
        Arc::new(queue),
        Arc::new(audit),
        filter,
    );

    let stats = coordinator.run_pass().await.context("Scan pass failed")?;

    tracing::info!(
        "Shard {}: {} logs completed, {} skipped, {} throttled, {} abandoned, {} failed",
        config.scan.shard,
        stats.logs_completed,
        stats.logs_skipped,
        stats.logs_throttled,
        stats.logs_abandoned,
        stats.logs_failed,
    );

    Ok(())
}

/// Fetch the public log list and register every acceptable URL.
async fn import_logs(config: &Config, state: &dyn StateStore) -> anyhow::Result<()> {
    let fetcher = LogListFetcher::new()?;
    let urls = fetcher
        .fetch_usable_logs(
            &config.log_list.url,
            config.log_list.include_readonly,
            config.log_list.include_pending,
        )
        .await?;

    for url in &urls {
        state.register_log(url).await?;
    }

    tracing::info!("Registered {} logs", urls.len());
    Ok(())
}

/// Partition each registered log's current tree into contiguous shard
/// ranges. Logs that fail to answer are skipped, not fatal.
async fn seed_shards(
    config: &Config,
    state: &dyn StateStore,
    shard_count: u32,
) -> anyhow::Result<()> {
    let fetch_timeout = Duration::from_secs(config.scan.fetch_timeout_secs);
    let log_urls = state.log_urls().await?;
    let mut seeded = 0usize;

    for log_url in &log_urls {
        let client = match LogClient::new(log_url, fetch_timeout) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("{}: unusable log URL, skipping: {:?}", log_url, e);
                continue;
            }
        };

        let sth = match client.get_sth().await {
            Ok(sth) => sth,
            Err(e) => {
                tracing::warn!("{}: failed to fetch STH, skipping: {:?}", log_url, e);
                continue;
            }
        };

        for (shard, range) in partition(sth.tree_size, shard_count).into_iter().enumerate() {
            state.set_range(log_url, shard as u32, range).await?;
        }

        tracing::info!(
            "{}: seeded {} shards over {} entries",
            log_url,
            shard_count,
            sth.tree_size
        );
        seeded += 1;
    }

    tracing::info!("Seeded {}/{} logs", seeded, log_urls.len());
    Ok(())
}

/// Split `[0, tree_size)` into contiguous ranges; the remainder lands in the
/// last shard.
fn partition(tree_size: u64, shards: u32) -> Vec<ShardRange> {
    let shards = shards.max(1) as u64;
    let width = tree_size / shards;

    (0..shards)
        .map(|i| {
            let start = i * width;
            let end = if i == shards - 1 { tree_size } else { (i + 1) * width };
            ShardRange { start, end }
        })
        .collect()
}
