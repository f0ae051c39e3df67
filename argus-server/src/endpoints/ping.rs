use axum::extract::State;
use axum::http::StatusCode;

use crate::service::{ServiceError, ServiceState};

/// `GET /ping`: storage health check. Responds 500 when the database
/// backend is unreachable; the in-memory backend is always healthy.
pub async fn handle(State(state): State<ServiceState>) -> Result<StatusCode, ServiceError> {
    state.service().ping().await?;
    Ok(StatusCode::OK)
}
