use std::path::{Path, PathBuf};

use anyhow::Context;
use argus_agent::AgentConfig;
use argus_server::ServerConfig;
use clap::{ArgAction, Args, Parser, Subcommand};
use ipnetwork::IpNetwork;
use serde::de::DeserializeOwned;

#[derive(Debug, Parser)]
#[command(name = "argus", version, about = "Fleet metrics pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the metrics collection agent.
    Agent(AgentArgs),
    /// Run the collector server.
    Server(ServerArgs),
}

#[derive(Debug, Default, Args)]
pub struct AgentArgs {
    /// Path to a JSON config file.
    #[arg(short, long, env = "CONFIG")]
    config: Option<PathBuf>,

    /// Collector server address (host:port).
    #[arg(short, long, env = "ADDRESS")]
    address: Option<String>,

    /// Seconds between metric samples.
    #[arg(short, long, env = "POLL_INTERVAL")]
    poll_interval: Option<u64>,

    /// Seconds between report cycles.
    #[arg(short, long, env = "REPORT_INTERVAL")]
    report_interval: Option<u64>,

    /// Shared secret for payload digests.
    #[arg(short = 'k', long, env = "KEY")]
    hash_key: Option<String>,

    /// Maximum report requests per second.
    #[arg(short = 'l', long, env = "RATE_LIMIT")]
    rate_limit: Option<u32>,

    /// Report over https instead of http.
    #[arg(long, env = "ENABLE_HTTPS", action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    enable_https: Option<bool>,
}

impl AgentArgs {
    /// Resolves the final configuration: flags and environment override the
    /// config file, which overrides defaults.
    pub fn into_config(self) -> anyhow::Result<AgentConfig> {
        let mut config: AgentConfig = load_or_default(self.config.as_deref())?;

        if let Some(address) = self.address {
            config.server_address = address;
        }
        if let Some(poll_interval) = self.poll_interval {
            config.poll_interval = poll_interval;
        }
        if let Some(report_interval) = self.report_interval {
            config.report_interval = report_interval;
        }
        if let Some(hash_key) = self.hash_key {
            config.hash_key = Some(hash_key);
        }
        if let Some(rate_limit) = self.rate_limit {
            config.rate_limit = rate_limit;
        }
        if let Some(enable_https) = self.enable_https {
            config.enable_https = enable_https;
        }

        Ok(config)
    }
}

#[derive(Debug, Default, Args)]
pub struct ServerArgs {
    /// Path to a JSON config file.
    #[arg(short, long, env = "CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (host:port).
    #[arg(short, long, env = "ADDRESS")]
    address: Option<String>,

    /// Seconds between store snapshots; 0 persists every update.
    #[arg(short = 'i', long, env = "STORE_INTERVAL")]
    store_interval: Option<u64>,

    /// Path of the JSON snapshot file; empty disables snapshots.
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
    store_file: Option<String>,

    /// Load the snapshot file on startup.
    #[arg(short = 'r', long, env = "RESTORE", action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    restore: Option<bool>,

    /// Postgres connection string; selects the database backend.
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    database_url: Option<String>,

    /// Shared secret for payload digests.
    #[arg(short = 'k', long, env = "KEY")]
    hash_key: Option<String>,

    /// CIDR allow-list for agent addresses, e.g. `10.0.0.0/8`.
    #[arg(short = 't', long, env = "TRUSTED_SUBNET")]
    trusted_subnet: Option<IpNetwork>,
}

impl ServerArgs {
    /// Resolves the final configuration: flags and environment override the
    /// config file, which overrides defaults.
    pub fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config: ServerConfig = load_or_default(self.config.as_deref())?;

        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(store_interval) = self.store_interval {
            config.store_interval = store_interval;
        }
        if let Some(store_file) = self.store_file {
            config.file_storage_path = store_file;
        }
        if let Some(restore) = self.restore {
            config.restore = restore;
        }
        if let Some(database_url) = self.database_url {
            config.database_url = Some(database_url);
        }
        if let Some(hash_key) = self.hash_key {
            config.hash_key = Some(hash_key);
        }
        if let Some(trusted_subnet) = self.trusted_subnet {
            config.trusted_subnet = Some(trusted_subnet);
        }

        Ok(config)
    }
}

fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> anyhow::Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };

    let data = std::fs::read(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
