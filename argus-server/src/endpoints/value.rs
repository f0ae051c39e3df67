use argus_metrics::{MetricDto, MetricType, MetricValue};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::extractors::SignedJson;
use crate::service::{ServiceError, ServiceState};

use super::common;

/// `POST /value/`: single-metric lookup with a JSON body carrying the
/// metric identity. The value and delta fields of the request are ignored.
pub async fn handle_json(
    State(state): State<ServiceState>,
    SignedJson(dto): SignedJson<MetricDto>,
) -> Result<Response, ServiceError> {
    let stored = state.service().fetch(&dto.id, dto.ty).await?;
    Ok(common::signed_json(&state, &stored))
}

/// `GET /value/{type}/{name}`: legacy lookup returning the canonical string
/// form of the value as a plain-text body.
pub async fn handle_path(
    State(state): State<ServiceState>,
    Path((ty, name)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    let Ok(ty) = ty.parse::<MetricType>() else {
        return Ok((StatusCode::BAD_REQUEST, format!("unknown metric type `{ty}`")).into_response());
    };

    let stored = state.service().fetch(&name, ty).await?;
    let value = match (stored.value, stored.delta) {
        (Some(value), _) => MetricValue::Gauge(value).to_canonical_string(),
        (_, Some(delta)) => MetricValue::Counter(delta).to_canonical_string(),
        (None, None) => return Err(ServiceError::NotFound),
    };

    Ok(value.into_response())
}
