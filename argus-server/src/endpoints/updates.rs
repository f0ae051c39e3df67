use argus_metrics::MetricDto;
use axum::extract::State;
use axum::response::Response;

use crate::extractors::SignedJson;
use crate::service::{ServiceError, ServiceState};

use super::common;

/// `POST /updates/`: the batch ingestion endpoint used by agents.
///
/// Responds with the stored records after the merge, in input order, so an
/// agent can observe the running totals its deltas produced.
pub async fn handle(
    State(state): State<ServiceState>,
    SignedJson(batch): SignedJson<Vec<MetricDto>>,
) -> Result<Response, ServiceError> {
    let stored = state.service().apply_batch(&batch).await?;
    tracing::debug!(count = stored.len(), "accepted metrics batch");
    Ok(common::signed_json(&state, &stored))
}
