// src/cli.rs
use clap::{Parser, Subcommand};

/// ct-sweep: sharded Certificate Transparency log scanner
///
/// Walks this shard's assigned index range of every registered CT log,
/// reports certificates whose subject names fall under the watched
/// cousin-domain suffixes, and checkpoints progress as it goes.
#[derive(Parser, Debug, Clone)]
#[command(name = "ct-sweep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to TOML config file
    #[arg(short = 'c', long = "config", default_value = "config.toml")]
    pub config: String,

    /// Override the shard identifier from config
    #[arg(long = "shard")]
    pub shard: Option<u32>,

    /// Verbose logging (set log level to debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet logging (set log level to warn)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one scan pass over this shard's ranges (the default)
    Scan,

    /// Fetch the public CT log list and register usable log URLs
    ImportLogs,

    /// Seed shard ranges for every registered log from its current tree size
    Seed {
        /// Number of contiguous shards to partition each log into
        #[arg(long = "shards", default_value_t = 1)]
        shards: u32,
    },
}

impl Cli {
    /// Validate flag combinations and return errors for invalid usage
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.verbose && self.quiet {
            anyhow::bail!("Cannot specify both --verbose and --quiet");
        }

        if let Some(Command::Seed { shards }) = &self.command {
            if *shards == 0 {
                anyhow::bail!("--shards must be greater than 0");
            }
        }

        Ok(())
    }

    /// Determine log level based on verbose/quiet flags
    pub fn log_level(&self) -> Option<&str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("warn")
        } else {
            None
        }
    }
}
