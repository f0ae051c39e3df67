use argus_metrics::{Metric, MetricType, MetricValue};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::StorageError;

/// Upsert with the merge semantics of the metric model pushed into SQL:
/// counters add to the stored total, gauges replace it. Values are kept in
/// canonical string form, so the counter branch casts through `bigint`.
const UPSERT_SQL: &str = "
    INSERT INTO metrics (name, type, value) VALUES ($1, $2, $3)
    ON CONFLICT (name, type) DO UPDATE
    SET value = CASE
        WHEN metrics.type = 'counter'
            THEN ((metrics.value::bigint) + (EXCLUDED.value::bigint))::text
        ELSE EXCLUDED.value
    END
    RETURNING name, type, value
";

/// Postgres-backed metric store.
///
/// The schema is managed by the embedded migrations and applied on connect.
/// Durability comes from the database; the snapshot machinery of the
/// in-memory backend does not apply here.
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connects to the database and applies pending migrations.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().max_connections(8).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn upsert(&self, metric: &Metric) -> Result<Metric, StorageError> {
        let row = sqlx::query(UPSERT_SQL)
            .bind(&metric.name)
            .bind(metric.ty().as_str())
            .bind(metric.value.to_canonical_string())
            .fetch_one(&self.pool)
            .await?;
        decode_row(&row)
    }

    /// Applies the batch in one transaction; either every row lands or none
    /// does.
    pub async fn upsert_all(&self, metrics: &[Metric]) -> Result<Vec<Metric>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let mut stored = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let row = sqlx::query(UPSERT_SQL)
                .bind(&metric.name)
                .bind(metric.ty().as_str())
                .bind(metric.value.to_canonical_string())
                .fetch_one(&mut *tx)
                .await?;
            stored.push(decode_row(&row)?);
        }

        tx.commit().await?;
        Ok(stored)
    }

    pub async fn find_one(
        &self,
        name: &str,
        ty: MetricType,
    ) -> Result<Option<Metric>, StorageError> {
        let row = sqlx::query("SELECT name, type, value FROM metrics WHERE name = $1 AND type = $2")
            .bind(name)
            .bind(ty.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_row).transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<Metric>, StorageError> {
        let rows = sqlx::query("SELECT name, type, value FROM metrics ORDER BY name, type")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_row).collect()
    }

    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_row(row: &PgRow) -> Result<Metric, StorageError> {
    let name: String = row.try_get("name")?;
    let ty: String = row.try_get("type")?;
    let raw: String = row.try_get("value")?;

    let ty = ty
        .parse::<MetricType>()
        .map_err(|_| StorageError::Malformed(argus_metrics::ParseMetricError {
            value: ty,
            expected: "metric type",
        }))?;
    let value = MetricValue::from_canonical_string(ty, &raw)?;
    Ok(Metric { name, value })
}
