//! HMAC-SHA256 job receipts.
//!
//! The receipt secret is shared out-of-band with workers. A receipt commits
//! to `job_id:node_id:duration`; the comparison is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use troop_core::types::{JobId, NodeId};

type HmacSha256 = Hmac<Sha256>;

fn receipt_mac(secret: &str, job_id: &JobId, node_id: &NodeId, duration_seconds: i64) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{job_id}:{node_id}:{duration_seconds}").as_bytes());
    mac
}

/// Produce the hex receipt signature a worker attaches to a completed job.
pub fn receipt_signature(
    secret: &str,
    job_id: &JobId,
    node_id: &NodeId,
    duration_seconds: i64,
) -> String {
    hex::encode(receipt_mac(secret, job_id, node_id, duration_seconds).finalize().into_bytes())
}

/// Constant-time check of a hex receipt signature. Malformed hex fails.
pub fn verify_receipt(
    secret: &str,
    job_id: &JobId,
    node_id: &NodeId,
    duration_seconds: i64,
    signature_hex: &str,
) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    receipt_mac(secret, job_id, node_id, duration_seconds)
        .verify_slice(&signature)
        .is_ok()
}
