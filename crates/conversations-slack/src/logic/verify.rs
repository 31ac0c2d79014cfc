//! Webhook request signature verification
//!
//! Implements Slack's v0 signing scheme: HMAC-SHA256 over
//! `"v0:{timestamp}:{body}"` keyed with the tenant's signing secret, hex
//! encoded and prefixed with `v0=`. Requests older (or newer) than the replay
//! window are rejected before any HMAC work.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::trace;

type HmacSha256 = Hmac<Sha256>;

/// Replay window in seconds, per Slack's verification guidance.
const REPLAY_WINDOW_SECS: i64 = 300;

const SIGNATURE_VERSION: &str = "v0";

/// Verify an inbound webhook request against a tenant's signing secret.
///
/// Returns `false` for any defect: unparsable timestamp, a timestamp outside
/// the replay window, or a signature mismatch. Never errors; the caller maps
/// `false` to an authentication failure.
pub fn verify_signature(signing_secret: &str, timestamp: &str, body: &str, signature: &str) -> bool {
    verify_signature_at(
        signing_secret,
        timestamp,
        body,
        signature,
        chrono::Utc::now().timestamp(),
    )
}

/// As [`verify_signature`], with the clock injected for testing.
pub fn verify_signature_at(
    signing_secret: &str,
    timestamp: &str,
    body: &str,
    signature: &str,
    now_secs: i64,
) -> bool {
    let Ok(request_secs) = timestamp.parse::<i64>() else {
        trace!("Rejecting webhook with unparsable timestamp");
        return false;
    };
    if (now_secs - request_secs).abs() > REPLAY_WINDOW_SECS {
        trace!(
            age_secs = now_secs - request_secs,
            "Rejecting webhook outside replay window"
        );
        return false;
    }

    let base = format!("{SIGNATURE_VERSION}:{timestamp}:{body}");
    let mut mac = match HmacSha256::new_from_slice(signing_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(base.as_bytes());
    let expected = format!("{SIGNATURE_VERSION}={}", hex::encode(mac.finalize().into_bytes()));

    // Constant-time compare so signature contents can't be probed byte by
    // byte through response timing.
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
