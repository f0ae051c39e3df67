use std::io::Write;
use std::net::{IpAddr, UdpSocket};
use std::time::Duration;

use argus_metrics::{payload_digest, MetricDto, DIGEST_HEADER};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::AgentConfig;

/// Per-attempt request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Total attempts per report cycle (first try plus retries).
const MAX_ATTEMPTS: u32 = 4;

/// Backoff floor and ceiling between attempts.
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Error produced while delivering a batch.
///
/// Serialization and missing-local-state errors are fatal for the attempt
/// and never retried; transport errors, timeouts and non-success responses
/// are retried up to the attempt budget and then surfaced as [`Exhausted`].
///
/// [`Exhausted`]: SendError::Exhausted
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to serialize metrics batch")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to compress metrics batch")]
    Compress(#[source] std::io::Error),

    #[error("no usable local address for the X-Real-IP header")]
    NoLocalAddress(#[source] std::io::Error),

    #[error("could not send request")]
    Http(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("giving up after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<SendError>,
    },
}

impl SendError {
    /// Returns `true` for failures that are expected to resolve on retry.
    fn is_retriable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status(_))
    }
}

/// Transport client that delivers a batch of metrics to the collector.
///
/// The dispatcher treats this as a seam: tests substitute a recording
/// implementation. The returned future must be `Send` so the dispatcher
/// loop can be spawned onto the runtime.
pub trait MetricsSender {
    /// Delivers one batch, applying the sender's own retry policy.
    fn send(
        &self,
        batch: &[MetricDto],
    ) -> impl std::future::Future<Output = Result<(), SendError>> + Send;
}

/// JSON-over-HTTP sender.
///
/// Delivery steps, in order: serialize, digest (when a hash key is
/// configured), gzip, then POST with bounded retries. The digest covers the
/// uncompressed body, so the server verifies it after transport decoding.
pub struct HttpSender {
    client: reqwest::Client,
    url: String,
    hash_key: Option<String>,
}

impl HttpSender {
    pub fn new(config: &AgentConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            url: config.report_url(),
            hash_key: config.hash_key.clone(),
        })
    }

    async fn attempt(
        &self,
        compressed: &[u8],
        digest: Option<&str>,
        real_ip: &str,
    ) -> Result<(), SendError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Content-Encoding", "gzip")
            .header("X-Real-IP", real_ip)
            .body(compressed.to_vec());

        if let Some(digest) = digest {
            request = request.header(DIGEST_HEADER, digest);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SendError::Status(response.status()));
        }

        Ok(())
    }
}

impl MetricsSender for HttpSender {
    async fn send(&self, batch: &[MetricDto]) -> Result<(), SendError> {
        let body = serde_json::to_vec(batch).map_err(SendError::Serialize)?;
        let digest = self
            .hash_key
            .as_deref()
            .map(|key| payload_digest(&body, key));
        let compressed = compress(&body).map_err(SendError::Compress)?;
        let real_ip = local_ip().map_err(SendError::NoLocalAddress)?.to_string();

        let mut backoff = ExponentialBackoff {
            initial_interval: BACKOFF_BASE,
            max_interval: BACKOFF_CAP,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.attempt(&compressed, digest.as_deref(), &real_ip).await {
                Ok(()) => return Ok(()),
                Err(err) if !err.is_retriable() => return Err(err),
                Err(err) => err,
            };

            if attempt >= MAX_ATTEMPTS {
                return Err(SendError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = backoff.next_backoff().unwrap_or(BACKOFF_CAP);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = &err as &dyn std::error::Error,
                "metrics delivery failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Picks the local address the collector will see in `X-Real-IP`.
///
/// Connecting a UDP socket routes without sending any packet; the socket's
/// local address is the outbound interface address.
fn local_ip() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.connect(("203.0.113.1", 9))?;
    Ok(socket.local_addr()?.ip())
}
