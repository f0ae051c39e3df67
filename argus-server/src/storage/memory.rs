use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use argus_metrics::{storage_key, Metric, MetricType};
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;

use super::StorageError;

/// In-memory metric store with optional JSON snapshots.
///
/// Metrics are keyed by `{name}_{type}`. Snapshots serialize the full map
/// as a JSON object from storage key to self-describing record, with keys
/// sorted so the file is stable across runs.
///
/// Persistence runs in one of three modes:
///  - no snapshot path: purely in-memory,
///  - write-through: every accepted update rewrites the file,
///  - periodic: a background task rewrites the file on an interval.
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

struct Inner {
    metrics: Mutex<HashMap<String, Metric>>,
    snapshot_path: Option<PathBuf>,
    write_through: bool,
}

impl MemoryStorage {
    /// Creates a purely in-memory store.
    pub fn new() -> Self {
        Self::with_snapshots(None, false)
    }

    /// Creates a store that snapshots to `path`. With `write_through` set,
    /// every update persists immediately and no background task is needed.
    pub fn with_snapshots(path: Option<PathBuf>, write_through: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                metrics: Mutex::new(HashMap::new()),
                snapshot_path: path,
                write_through,
            }),
        }
    }

    /// Loads the snapshot file, replacing the current contents.
    ///
    /// A missing file is not an error; the store simply starts empty.
    /// Returns the number of metrics restored.
    pub fn restore(&self) -> Result<usize, StorageError> {
        let Some(path) = self.inner.snapshot_path.as_deref() else {
            return Ok(0);
        };

        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(StorageError::Snapshot(error)),
        };

        let restored: HashMap<String, Metric> =
            serde_json::from_slice(&data).map_err(StorageError::MalformedSnapshot)?;

        let mut metrics = self.inner.metrics.lock();
        metrics.clear();
        // Keys are recomputed from the records themselves; the file's keys
        // are only a convenience for humans reading it.
        for metric in restored.into_values() {
            metrics.insert(metric.storage_key(), metric);
        }
        Ok(metrics.len())
    }

    /// Writes the current contents to the snapshot file, atomically via a
    /// temporary file in the same directory. A no-op without a path.
    pub fn snapshot(&self) -> Result<(), StorageError> {
        let Some(path) = self.inner.snapshot_path.as_deref() else {
            return Ok(());
        };
        self.inner.write_snapshot(path)
    }

    /// Spawns a task that snapshots every `interval`.
    ///
    /// The task holds only a weak reference and exits once the storage is
    /// dropped. Snapshot failures are logged and do not stop the task.
    pub fn spawn_snapshotter(&self, interval: Duration) {
        if self.inner.snapshot_path.is_none() || self.inner.write_through {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await;

            loop {
                tick.tick().await;
                let Some(inner) = Weak::upgrade(&weak) else {
                    break;
                };
                let Some(path) = inner.snapshot_path.as_deref() else {
                    break;
                };
                if let Err(error) = inner.write_snapshot(path) {
                    tracing::error!(
                        error = &error as &dyn std::error::Error,
                        "periodic snapshot failed"
                    );
                }
            }
        });
    }

    pub fn upsert(&self, metric: Metric) -> Result<Metric, StorageError> {
        let stored = {
            let mut metrics = self.inner.metrics.lock();
            Self::merge_locked(&mut metrics, metric)
        };

        self.persist_if_write_through()?;
        Ok(stored)
    }

    pub fn upsert_all(&self, batch: Vec<Metric>) -> Result<Vec<Metric>, StorageError> {
        // The lock is held across the whole batch so readers never observe
        // a partially applied update.
        let stored = {
            let mut metrics = self.inner.metrics.lock();
            batch
                .into_iter()
                .map(|metric| Self::merge_locked(&mut metrics, metric))
                .collect()
        };

        self.persist_if_write_through()?;
        Ok(stored)
    }

    pub fn find_one(&self, name: &str, ty: MetricType) -> Option<Metric> {
        self.inner
            .metrics
            .lock()
            .get(&storage_key(name, ty))
            .cloned()
    }

    pub fn find_all(&self) -> Vec<Metric> {
        let mut all: Vec<_> = self.inner.metrics.lock().values().cloned().collect();
        all.sort_by(|a, b| a.storage_key().cmp(&b.storage_key()));
        all
    }

    fn merge_locked(metrics: &mut HashMap<String, Metric>, incoming: Metric) -> Metric {
        let entry = metrics
            .entry(incoming.storage_key())
            .and_modify(|stored| stored.value.merge(incoming.value))
            .or_insert(incoming);
        entry.clone()
    }

    fn persist_if_write_through(&self) -> Result<(), StorageError> {
        match (self.inner.write_through, self.inner.snapshot_path.as_deref()) {
            (true, Some(path)) => self.inner.write_snapshot(path),
            _ => Ok(()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn write_snapshot(&self, path: &Path) -> Result<(), StorageError> {
        let all: std::collections::BTreeMap<String, Metric> = self
            .metrics
            .lock()
            .iter()
            .map(|(key, metric)| (key.clone(), metric.clone()))
            .collect();

        let data = serde_json::to_vec_pretty(&all).map_err(StorageError::MalformedSnapshot)?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data).map_err(StorageError::Snapshot)?;
        std::fs::rename(&tmp, path).map_err(StorageError::Snapshot)?;
        Ok(())
    }
}
