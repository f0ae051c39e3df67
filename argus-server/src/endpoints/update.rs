use argus_metrics::{MetricDto, MetricType, MetricValue};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::extractors::SignedJson;
use crate::service::{ServiceError, ServiceState};

use super::common;

/// `POST /update/`: single-metric ingestion with a JSON body.
pub async fn handle_json(
    State(state): State<ServiceState>,
    SignedJson(dto): SignedJson<MetricDto>,
) -> Result<Response, ServiceError> {
    let stored = state.service().apply(&dto).await?;
    Ok(common::signed_json(&state, &stored))
}

/// `POST /update/{type}/{name}/{value}`: legacy ingestion with the metric
/// encoded in the path. An unknown type or a value that does not parse as
/// that type is the client's fault: 400.
pub async fn handle_path(
    State(state): State<ServiceState>,
    Path((ty, name, value)): Path<(String, String, String)>,
) -> Result<Response, ServiceError> {
    let Ok(ty) = ty.parse::<MetricType>() else {
        return Ok((StatusCode::BAD_REQUEST, format!("unknown metric type `{ty}`")).into_response());
    };
    let value = match MetricValue::from_canonical_string(ty, &value) {
        Ok(value) => value,
        Err(error) => return Ok((StatusCode::BAD_REQUEST, error.to_string()).into_response()),
    };

    let dto = match value {
        MetricValue::Gauge(value) => MetricDto::gauge(name, value),
        MetricValue::Counter(delta) => MetricDto::counter(name, delta),
    };

    state.service().apply(&dto).await?;
    Ok(StatusCode::OK.into_response())
}
