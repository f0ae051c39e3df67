//! Tower layers and axum middleware for the HTTP server.
//!
//! Registered in [`make_app`](crate::server::make_app); the trusted-subnet
//! check is scoped to the update routes only.

use std::net::IpAddr;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use crate::service::ServiceState;

pub fn trace_http_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::DEBUG))
}

/// Rejects update requests whose `X-Real-IP` falls outside the configured
/// trusted subnet.
///
/// A pass-through when no subnet is configured. With a subnet set, a
/// missing or unparsable header is treated the same as an address outside
/// the range: 403.
pub async fn trusted_subnet(
    State(state): State<ServiceState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(subnet) = state.config().trusted_subnet {
        let allowed = request
            .headers()
            .get("X-Real-IP")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<IpAddr>().ok())
            .is_some_and(|ip| subnet.contains(ip));

        if !allowed {
            tracing::debug!("rejecting update from outside the trusted subnet");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    next.run(request).await
}
