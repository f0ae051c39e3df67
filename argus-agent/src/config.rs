use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_address() -> String {
    "localhost:8080".to_owned()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> u32 {
    1
}

/// Agent configuration.
///
/// The same struct is used for the optional JSON config file; the CLI merges
/// flags, environment and file values with flag > env > file > default
/// precedence before handing the result here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Collector server address (`host:port`).
    #[serde(rename = "address")]
    pub server_address: String,
    /// Interval between collector samples, in seconds.
    pub poll_interval: u64,
    /// Interval between report cycles, in seconds.
    pub report_interval: u64,
    /// Shared secret for the `HashSHA256` payload digest. No digest is
    /// attached when unset.
    pub hash_key: Option<String>,
    /// Maximum number of report requests per second (token bucket burst).
    pub rate_limit: u32,
    /// Use `https` for the report endpoint.
    pub enable_https: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_address: default_address(),
            poll_interval: default_poll_interval(),
            report_interval: default_report_interval(),
            hash_key: None,
            rate_limit: default_rate_limit(),
            enable_https: false,
        }
    }
}

impl AgentConfig {
    /// Interval between collector samples.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }

    /// Interval between report cycles.
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval.max(1))
    }

    /// The batch update endpoint reports are delivered to.
    pub fn report_url(&self) -> String {
        let scheme = if self.enable_https { "https" } else { "http" };
        format!("{scheme}://{}/updates/", self.server_address)
    }
}
