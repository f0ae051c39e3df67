//! Storage backends for collected metrics.
//!
//! Two backends exist: an in-memory map with optional JSON snapshots
//! ([`MemoryStorage`]) and Postgres ([`PgStorage`]). [`MetricsStorage`]
//! dispatches between them with an enum rather than a boxed trait object;
//! the set of backends is closed and known at compile time, and the enum
//! keeps calls direct and the error type concrete.

mod memory;
mod postgres;

use argus_metrics::{Metric, MetricType, ParseMetricError};

pub use self::memory::MemoryStorage;
pub use self::postgres::PgStorage;

/// Postgres error codes treated as transient: connection failure, the
/// server shutting down, and unique violations from concurrent upserts.
const RETRIABLE_PG_CODES: &[&str] = &["08006", "57P03", "23505"];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The snapshot file exists but does not parse.
    #[error("malformed snapshot file")]
    MalformedSnapshot(#[source] serde_json::Error),

    /// Reading or writing the snapshot file failed.
    #[error("snapshot i/o failed")]
    Snapshot(#[source] std::io::Error),

    /// A stored value does not parse as its metric type.
    #[error("stored value is malformed")]
    Malformed(#[from] ParseMetricError),

    #[error("database query failed")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("giving up after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<StorageError>,
    },
}

impl StorageError {
    /// Returns `true` for failures that are expected to resolve on retry.
    ///
    /// Only transient database errors qualify; the in-memory backend has
    /// no retriable failure class, so snapshot errors are fatal for the
    /// call.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Io(_)) => true,
            Self::Database(sqlx::Error::PoolTimedOut) => true,
            Self::Database(sqlx::Error::Database(error)) => error
                .code()
                .is_some_and(|code| RETRIABLE_PG_CODES.contains(&code.as_ref())),
            _ => false,
        }
    }
}

/// The configured storage backend.
pub enum MetricsStorage {
    Memory(MemoryStorage),
    Postgres(PgStorage),
}

impl MetricsStorage {
    /// Applies one update and returns the stored metric after the merge.
    pub async fn upsert(&self, metric: Metric) -> Result<Metric, StorageError> {
        match self {
            Self::Memory(storage) => storage.upsert(metric),
            Self::Postgres(storage) => storage.upsert(&metric).await,
        }
    }

    /// Applies a batch atomically and returns the stored metrics in input
    /// order.
    ///
    /// Duplicate `(name, type)` pairs within the batch merge sequentially,
    /// so later entries observe the effect of earlier ones.
    pub async fn upsert_all(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>, StorageError> {
        match self {
            Self::Memory(storage) => storage.upsert_all(metrics),
            Self::Postgres(storage) => storage.upsert_all(&metrics).await,
        }
    }

    pub async fn find_one(
        &self,
        name: &str,
        ty: MetricType,
    ) -> Result<Option<Metric>, StorageError> {
        match self {
            Self::Memory(storage) => Ok(storage.find_one(name, ty)),
            Self::Postgres(storage) => storage.find_one(name, ty).await,
        }
    }

    pub async fn find_all(&self) -> Result<Vec<Metric>, StorageError> {
        match self {
            Self::Memory(storage) => Ok(storage.find_all()),
            Self::Postgres(storage) => storage.find_all().await,
        }
    }

    /// Verifies backend health: a database round-trip for Postgres, always
    /// healthy for the in-memory backend.
    pub async fn ping(&self) -> Result<(), StorageError> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::Postgres(storage) => storage.ping().await,
        }
    }

    /// Releases the backend: a final snapshot for the in-memory store, a
    /// pool close for Postgres.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        match self {
            Self::Memory(storage) => storage.snapshot(),
            Self::Postgres(storage) => {
                storage.close().await;
                Ok(())
            }
        }
    }
}
