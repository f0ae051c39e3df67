//! The metrics collector server.
//!
//! Accepts metric updates from agents over HTTP, merges them into one of
//! two storage backends (in-memory with optional JSON snapshots, or
//! Postgres), and serves the stored values back out.
//!
//! The layering is conventional: endpoints parse and respond,
//! [`MetricsService`] validates and applies the retry policy, and
//! [`MetricsStorage`] merges. Counters accumulate and gauges replace; the
//! exact merge rules live in the shared `argus-metrics` crate.

mod config;
mod endpoints;
mod extractors;
mod middlewares;
mod retry;
mod server;
mod service;
mod storage;

pub use self::config::ServerConfig;
pub use self::retry::Retrier;
pub use self::server::{make_app, run};
pub use self::service::{MetricsService, ServiceError, ServiceState};
pub use self::storage::{MemoryStorage, MetricsStorage, PgStorage, StorageError};
