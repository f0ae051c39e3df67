use std::time::Duration;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

fn default_address() -> String {
    "localhost:8080".to_owned()
}

fn default_store_interval() -> u64 {
    300
}

fn default_file_storage_path() -> String {
    "/tmp/metrics-db.json".to_owned()
}

fn default_restore() -> bool {
    true
}

/// Collector server configuration.
///
/// Doubles as the schema of the optional JSON config file; the CLI merges
/// flags, environment and file values with flag > env > file > default
/// precedence before handing the result here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (`host:port`).
    pub address: String,
    /// Seconds between snapshots of the in-memory store. Zero means
    /// write-through: every accepted update is persisted immediately.
    pub store_interval: u64,
    /// Path of the JSON snapshot file. Snapshotting is disabled when empty.
    #[serde(rename = "store_file")]
    pub file_storage_path: String,
    /// Load the snapshot file on startup.
    pub restore: bool,
    /// Postgres connection string. When set, the database backend replaces
    /// the in-memory store and snapshotting is not used.
    pub database_url: Option<String>,
    /// Shared secret for the `HashSHA256` payload digest. Requests are not
    /// verified and responses not signed when unset.
    pub hash_key: Option<String>,
    /// CIDR allow-list applied to the `X-Real-IP` header of update requests.
    pub trusted_subnet: Option<IpNetwork>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_interval: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            restore: default_restore(),
            database_url: None,
            hash_key: None,
            trusted_subnet: None,
        }
    }
}

impl ServerConfig {
    /// Interval between store snapshots; `None` selects write-through.
    pub fn store_interval(&self) -> Option<Duration> {
        (self.store_interval > 0).then(|| Duration::from_secs(self.store_interval))
    }

    /// Snapshot file path, unless snapshotting is disabled.
    pub fn snapshot_path(&self) -> Option<&str> {
        (!self.file_storage_path.is_empty()).then_some(self.file_storage_path.as_str())
    }
}
