//! Payload digest of the collector protocol.
//!
//! When a shared key is configured, both sides exchange a `HashSHA256`
//! header carrying the hex-encoded SHA-256 of the uncompressed JSON body
//! with the key appended. The digest is computed over `body || key` by
//! plain concatenation; this is the wire contract and both sides must
//! compute it identically.

use sha2::{Digest, Sha256};

/// Header carrying the payload digest.
pub const DIGEST_HEADER: &str = "HashSHA256";

/// Computes the hex-encoded SHA-256 digest of `body || key`.
pub fn payload_digest(body: &[u8], key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verifies a received digest against the decoded body.
///
/// Comparison is on the lowercase hex encoding, not on raw bytes, matching
/// what peers put on the wire.
pub fn verify_digest(body: &[u8], key: &str, received: &str) -> bool {
    payload_digest(body, key) == received.to_ascii_lowercase()
}
