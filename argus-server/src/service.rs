use std::sync::Arc;

use argus_metrics::{to_domain, to_response, Metric, MetricDto, MetricType, ValidationError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::config::ServerConfig;
use crate::retry::Retrier;
use crate::storage::{MetricsStorage, StorageError};

/// Error surfaced by the service layer, mapped onto HTTP status codes by
/// the [`IntoResponse`] impl: validation failures are the client's fault
/// (400), a miss on a read is 404, and everything that went wrong behind
/// the API is an opaque 500 with the detail kept in the logs.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("metric not found")]
    NotFound,

    #[error("storage failed")]
    Storage(#[from] StorageError),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(error) => {
                (StatusCode::BAD_REQUEST, error.to_string()).into_response()
            }
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Storage(error) => {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "storage operation failed"
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Application core between the HTTP layer and storage.
///
/// Validates incoming records, applies the retry policy around every
/// storage call, and translates stored metrics back into wire records.
pub struct MetricsService {
    storage: MetricsStorage,
    retrier: Retrier,
}

impl MetricsService {
    pub fn new(storage: MetricsStorage) -> Self {
        Self {
            storage,
            retrier: Retrier::default(),
        }
    }

    /// Applies a single update and returns the stored record after the
    /// merge.
    pub async fn apply(&self, dto: &MetricDto) -> Result<MetricDto, ServiceError> {
        let metric = to_domain(dto)?;
        let stored = self
            .retrier
            .run(|| self.storage.upsert(metric.clone()))
            .await?;
        Ok(to_response(&stored))
    }

    /// Applies a batch of updates and returns the stored records in input
    /// order.
    ///
    /// Validation runs over the whole batch up front; one malformed record
    /// rejects the entire request and nothing is written.
    pub async fn apply_batch(&self, dtos: &[MetricDto]) -> Result<Vec<MetricDto>, ServiceError> {
        let metrics = dtos
            .iter()
            .map(to_domain)
            .collect::<Result<Vec<Metric>, _>>()?;

        let stored = self
            .retrier
            .run(|| self.storage.upsert_all(metrics.clone()))
            .await?;
        Ok(stored.iter().map(to_response).collect())
    }

    /// Looks up one metric by identity.
    pub async fn fetch(&self, name: &str, ty: MetricType) -> Result<MetricDto, ServiceError> {
        let metric = self
            .retrier
            .run(|| self.storage.find_one(name, ty))
            .await?
            .ok_or(ServiceError::NotFound)?;
        Ok(to_response(&metric))
    }

    /// Returns all stored metrics, ordered by storage key.
    pub async fn fetch_all(&self) -> Result<Vec<Metric>, ServiceError> {
        Ok(self.retrier.run(|| self.storage.find_all()).await?)
    }

    /// Verifies database connectivity for the health endpoint.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        Ok(self.storage.ping().await?)
    }

    /// Flushes and releases the storage backend.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        Ok(self.storage.shutdown().await?)
    }
}

/// Shared handler state: the configuration and the service core behind one
/// cheap-to-clone handle.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

struct StateInner {
    config: ServerConfig,
    service: MetricsService,
}

impl ServiceState {
    pub fn new(config: ServerConfig, service: MetricsService) -> Self {
        Self {
            inner: Arc::new(StateInner { config, service }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn service(&self) -> &MetricsService {
        &self.inner.service
    }
}

#[cfg(test)]
mod tests {
    use argus_metrics::MetricValue;
    use similar_asserts::assert_eq;

    use crate::storage::MemoryStorage;

    use super::*;

    fn memory_service() -> MetricsService {
        MetricsService::new(MetricsStorage::Memory(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_apply_returns_merged_counter() {
        let service = memory_service();

        service
            .apply(&MetricDto::counter("PollCount", 2))
            .await
            .unwrap();
        let stored = service
            .apply(&MetricDto::counter("PollCount", 3))
            .await
            .unwrap();

        assert_eq!(stored.delta, Some(5));
    }

    #[tokio::test]
    async fn test_apply_rejects_missing_value() {
        let service = memory_service();
        let dto = MetricDto {
            id: "Alloc".to_owned(),
            ty: MetricType::Gauge,
            value: None,
            delta: None,
        };

        assert!(matches!(
            service.apply(&dto).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_rejects_wholesale_on_one_bad_record() {
        let service = memory_service();
        let batch = vec![
            MetricDto::gauge("Alloc", 1.0),
            MetricDto {
                id: String::new(),
                ty: MetricType::Gauge,
                value: Some(1.0),
                delta: None,
            },
        ];

        assert!(service.apply_batch(&batch).await.is_err());
        // the valid record must not have been written either
        assert!(matches!(
            service.fetch("Alloc", MetricType::Gauge).await,
            Err(ServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_fetch_miss_is_not_found() {
        let service = memory_service();
        assert!(matches!(
            service.fetch("Missing", MetricType::Counter).await,
            Err(ServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_fetch_all_sorted() {
        let service = memory_service();
        service
            .apply_batch(&[
                MetricDto::gauge("Zed", 1.0),
                MetricDto::counter("Alpha", 1),
            ])
            .await
            .unwrap();

        let all = service.fetch_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Alpha");
        assert_eq!(all[0].value, MetricValue::Counter(1));
        assert_eq!(all[1].name, "Zed");
    }
}
