//! HTTP endpoints of the collector server.

mod common;
mod index;
mod ping;
mod update;
mod updates;
mod value;

use axum::routing::{get, post};
use axum::Router;

use crate::middlewares;
use crate::service::ServiceState;

/// Builds the route table.
///
/// The trusted-subnet check wraps only the ingestion routes; reads and the
/// health check stay open.
pub fn routes(state: ServiceState) -> Router<ServiceState> {
    let ingest = Router::new()
        .route("/updates/", post(updates::handle))
        .route("/update/", post(update::handle_json))
        .route("/update/{type}/{name}/{value}", post(update::handle_path))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middlewares::trusted_subnet,
        ));

    Router::new()
        .merge(ingest)
        .route("/value/", post(value::handle_json))
        .route("/value/{type}/{name}", get(value::handle_path))
        .route("/ping", get(ping::handle))
        .route("/", get(index::handle))
}
