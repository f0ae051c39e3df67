use argus_metrics::{verify_digest, DIGEST_HEADER};
use axum::body::Bytes;
use axum::extract::{FromRef, FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;

use crate::service::ServiceState;

/// JSON body with `HashSHA256` verification.
///
/// Runs after transport decoding, so the digest covers the uncompressed
/// payload. When the server has a hash key configured, every request must
/// carry a matching digest header; a missing or mismatching digest is
/// rejected with 400. Without a configured key the header is ignored.
pub struct SignedJson<T>(pub T);

impl<S, T> FromRequest<S> for SignedJson<T>
where
    ServiceState: FromRef<S>,
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let service_state = ServiceState::from_ref(state);

        let received = req
            .headers()
            .get(DIGEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;

        if let Some(key) = service_state.config().hash_key.as_deref() {
            let Some(received) = received.as_deref() else {
                tracing::debug!("rejecting request without a payload digest");
                return Err(
                    (StatusCode::BAD_REQUEST, "missing payload digest").into_response()
                );
            };

            if !verify_digest(&bytes, key, received) {
                tracing::debug!("rejecting request with payload digest mismatch");
                return Err(
                    (StatusCode::BAD_REQUEST, "payload digest mismatch").into_response()
                );
            }
        }

        let value = serde_json::from_slice(&bytes).map_err(|error| {
            (StatusCode::BAD_REQUEST, format!("malformed JSON body: {error}")).into_response()
        })?;

        Ok(Self(value))
    }
}
