use argus_metrics::Metric;
use axum::extract::State;
use axum::Json;

use crate::service::{ServiceError, ServiceState};

/// `GET /`: a JSON array of everything currently stored, ordered by storage
/// key. Records are self-describing (`{"name", "type", "value"}`).
pub async fn handle(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<Metric>>, ServiceError> {
    let metrics = state.service().fetch_all().await?;
    Ok(Json(metrics))
}
