use argus_metrics::{payload_digest, DIGEST_HEADER};
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::service::ServiceState;

/// Serializes `payload` as a JSON response, attaching the `HashSHA256`
/// digest header when a hash key is configured.
///
/// The digest is computed over the serialized body before response
/// compression, mirroring what the extractor verifies on the way in.
pub fn signed_json(state: &ServiceState, payload: &impl Serialize) -> Response {
    let body = match serde_json::to_vec(payload) {
        Ok(body) => body,
        Err(error) => {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "failed to serialize response body"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let digest = state
        .config()
        .hash_key
        .as_deref()
        .map(|key| payload_digest(&body, key));

    let mut response = (
        [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response();

    if let Some(digest) = digest {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(DIGEST_HEADER.as_bytes()),
            HeaderValue::from_str(&digest),
        ) {
            response.headers_mut().insert(name, value);
        }
    }

    response
}
