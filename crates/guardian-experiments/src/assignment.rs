//! Deterministic user bucketing.
//!
//! The bucket is derived from SHA-256 of `"{experiment_id}:{user_id}"`: the
//! first 8 hex characters of the digest are read as a `u32` and divided by
//! `0xFFFFFFFF`. The same pair always lands in the same bucket, across calls
//! and across processes.

use crate::experiment::Variant;
use sha2::{Digest, Sha256};

/// Bucket in `[0, 1]` for a user within an experiment
pub fn bucket_for(experiment_id: &str, user_id: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", experiment_id, user_id).as_bytes());
    let digest = hasher.finalize();

    // first 8 hex chars == first 4 bytes, big-endian
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix as f64 / u32::MAX as f64
}

/// Variant for a bucket under a treatment allocation
pub fn variant_for_bucket(bucket: f64, treatment_allocation: f64) -> Variant {
    if bucket < treatment_allocation {
        Variant::Treatment
    } else {
        Variant::Control
    }
}
